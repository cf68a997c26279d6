//! Staff credentials loaded from a CSV file.
//!
//! The file has the header `username,password,name,language,role,list` and is
//! read once at startup; [`CredentialStore::reload`] re-reads it on demand.
//! Rows missing a username or password are skipped with a warning. Every
//! field except the password is trimmed; passwords are compared exactly as
//! written.

use crate::validation::validate_list_name;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

/// What a staff account may do in the admin panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    /// Anything other than `admin` (case-insensitive) is a staff account.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Staff
        }
    }
}

/// One row of the credentials file.
#[derive(Clone)]
pub struct UserRecord {
    pub username: String,
    password: String,
    pub name: String,
    pub language: String,
    pub role: Role,
    pub list: String,
}

impl UserRecord {
    /// The record as exposed to sessions and API responses, without the password.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            username: self.username.clone(),
            name: self.name.clone(),
            language: self.language.clone(),
            role: self.role,
            list: self.list.clone(),
        }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("list", &self.list)
            .finish_non_exhaustive()
    }
}

/// A staff account minus its password.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub username: String,
    pub name: String,
    pub language: String,
    pub role: Role,
    pub list: String,
}

impl PublicUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Deserialize)]
struct CredentialRow {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    list: Option<String>,
}

/// In-memory credential table.
#[derive(Debug, Default)]
pub struct CredentialStore {
    source: Option<PathBuf>,
    users: Vec<UserRecord>,
}

impl CredentialStore {
    /// Loads credentials from `path`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::FileRead` if the file cannot be opened and
    /// `CoreError::Csv` if it is not valid CSV.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let file = std::fs::File::open(path).map_err(|source| CoreError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut store = Self::from_reader(file)?;
        store.source = Some(path.to_path_buf());
        tracing::info!("loaded {} staff accounts from {}", store.len(), path.display());
        Ok(store)
    }

    /// Parses credentials from any CSV source.
    pub fn from_reader<R: Read>(reader: R) -> CoreResult<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(reader);

        let mut users = Vec::new();
        for (index, row) in csv.deserialize::<CredentialRow>().enumerate() {
            let row = row?;
            let line = index + 2;
            let (Some(username), Some(password)) = (
                trimmed(row.username),
                row.password.filter(|p| !p.trim().is_empty()),
            ) else {
                tracing::warn!("credentials row {} has no username or password; skipped", line);
                continue;
            };

            let list = match trimmed(row.list) {
                Some(list) if validate_list_name(&list).is_ok() => list,
                Some(_) => {
                    tracing::warn!("credentials row {} has an invalid list name; list cleared", line);
                    String::new()
                }
                None => String::new(),
            };

            users.push(UserRecord {
                name: trimmed(row.name).unwrap_or_else(|| username.clone()),
                username,
                password,
                language: trimmed(row.language).unwrap_or_else(|| "en".into()),
                role: Role::parse(row.role.as_deref().unwrap_or_default()),
                list,
            });
        }

        Ok(Self {
            source: None,
            users,
        })
    }

    /// Re-reads the source file, replacing the table only on success.
    ///
    /// Returns the number of accounts now loaded.
    pub fn reload(&mut self) -> CoreResult<usize> {
        let Some(path) = self.source.clone() else {
            return Ok(self.len());
        };
        *self = Self::load(&path)?;
        Ok(self.len())
    }

    /// Matches username and password exactly (case-sensitive).
    pub fn authenticate(&self, username: &str, password: &str) -> Option<&UserRecord> {
        self.users
            .iter()
            .find(|u| u.username == username && u.password == password)
    }

    pub fn find(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
