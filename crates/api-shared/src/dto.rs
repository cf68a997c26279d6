//! Request and response bodies shared by the HTTP APIs.

use consent_cloud::{DocumentDeletion, DocumentLookup};
use consent_core::{PatientRecord, PublicUser, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub status: String,
    pub time: String,
}

/// Consent submission, from a JSON body or the query string.
///
/// Every field is optional at the wire level so that missing values are
/// reported as validation errors rather than body rejections.
#[derive(Clone, Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubmitReq {
    /// One of `accept`, `more_info`, `decline`
    #[serde(default)]
    pub response: Option<String>,
    /// Participant identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Submission token, required when the server is configured with one
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitRes {
    pub ok: bool,
    pub ts: String,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct LoginReq {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// A staff account as returned by the API. Never carries the password.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserRes {
    pub username: String,
    pub name: String,
    pub language: String,
    pub role: String,
    pub list: String,
}

impl From<PublicUser> for UserRes {
    fn from(user: PublicUser) -> Self {
        Self {
            role: match user.role {
                Role::Admin => "admin".into(),
                Role::Staff => "staff".into(),
            },
            username: user.username,
            name: user.name,
            language: user.language,
            list: user.list,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRes {
    pub success: bool,
    pub user: UserRes,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessRes {
    pub success: bool,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IndividualsQuery {
    /// Case-insensitive text matched against every field
    pub search: Option<String>,
    /// Field to sort by
    pub sort: Option<String>,
    /// `asc` (default) or `desc`
    pub direction: Option<String>,
}

/// One patient record: field name to value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct Individual(pub BTreeMap<String, String>);

impl From<PatientRecord> for Individual {
    fn from(record: PatientRecord) -> Self {
        Self(record.into_fields())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReloadRes {
    pub success: bool,
    pub users: usize,
    pub records: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentUploadRes {
    pub success: bool,
    pub path: String,
    pub size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentCheckRes {
    pub success: bool,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<DocumentLookup> for DocumentCheckRes {
    fn from(lookup: DocumentLookup) -> Self {
        Self {
            success: true,
            found: lookup.found,
            path: lookup.path,
            url: lookup.url,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentDeleteRes {
    pub success: bool,
    pub found: bool,
    pub deleted: Vec<String>,
}

impl From<DocumentDeletion> for DocumentDeleteRes {
    fn from(deletion: DocumentDeletion) -> Self {
        Self {
            success: true,
            found: deletion.found,
            deleted: deletion.deleted,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct CleanupReq {
    /// Overrides the configured retention window for this run
    #[serde(default)]
    pub retention_days: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
