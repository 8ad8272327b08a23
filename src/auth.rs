use std::{fmt, fs, io::Read, path::Path};

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Deserialize;
use tracing::{error, info, warn};

const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Analyst,
    Viewer,
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "admin" => Self::Admin,
            "analyst" => Self::Analyst,
            _ => Self::Viewer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admin => "admin",
            Self::Analyst => "analyst",
            Self::Viewer => "viewer",
        })
    }
}

#[derive(Deserialize)]
struct UserRecord {
    username: String,
    password: String,
    name: String,
    surname: String,
    role: String,
}

#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub role: Role,
    /// Argon2 PHC string or bcrypt hash.
    password_hash: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            role: Role::from(record.role.as_str()),
            username: record.username,
            name: record.name,
            surname: record.surname,
            password_hash: record.password,
        }
    }
}

/// Dashboard accounts read from a `username,password,name,surname,role` CSV.
///
/// Passwords are Argon2 PHC strings, which contain commas and so are quoted,
/// or bcrypt hashes from older user files.
#[derive(Debug, Default)]
pub struct UserStore {
    users: Vec<User>,
}

impl UserStore {
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open user store {}", path.display()))?;
        let store = Self::from_reader(file)
            .with_context(|| format!("Failed to load user store {}", path.display()))?;
        info!("Loaded {} users from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut users = Vec::new();
        for (line, record) in csv_reader.deserialize::<UserRecord>().enumerate() {
            match record {
                Ok(record) => users.push(User::from(record)),
                Err(e) => warn!("Skipping malformed user row {}: {}", line + 1, e),
            }
        }
        let store = Self { users };
        if store.is_empty() {
            warn!("User store is empty; nobody can log in");
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// The user whose name and password match, if any.
    pub fn check_credentials(&self, username: &str, password: &str) -> Option<&User> {
        let user = self.users.iter().find(|user| user.username == username)?;
        match verify(password, &user.password_hash) {
            Ok(true) => Some(user),
            Ok(false) => None,
            Err(e) => {
                error!("Stored password hash of {username} is invalid: {e}");
                None
            }
        }
    }
}

fn verify(password: &str, stored: &str) -> Result<bool> {
    if BCRYPT_PREFIXES.iter().any(|prefix| stored.starts_with(prefix)) {
        return Ok(bcrypt::verify(password, stored)?);
    }
    let hash = PasswordHash::new(stored).map_err(|e| anyhow!("{e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok())
}

/// Hashes a password into an Argon2 PHC string for the user store.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

#[cfg(test)]
pub(crate) fn sample_users() -> UserStore {
    let csv = format!(
        "username,password,name,surname,role\n\
         ada,\"{}\",Ada,Lovelace,admin\n\
         alan,\"{}\",Alan,Turing,analyst\n\
         grace,\"{}\",Grace,Hopper,intern\n",
        hash_password("engine").unwrap(),
        hash_password("enigma").unwrap(),
        hash_password("cobol").unwrap(),
    );
    UserStore::from_reader(csv.as_bytes()).unwrap()
}
