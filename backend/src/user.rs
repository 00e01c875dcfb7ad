use chrono::NaiveDate;
use friendship::{UserProfile, ValidationError};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use argon2::{
    password_hash::{
        rand_core::OsRng,
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString
    },
    Argon2
};

const NAME_MAX_LENGTH: usize = 32;
const BIOGRAPHY_MAX_LENGTH: usize = 2048;
const PASSWORD_MIN_LENGTH: usize = 8;
const PASSWORD_MAX_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: Uuid,
    first_name: String,
    second_name: String,
    birthdate: NaiveDate,
    biography: String,
    city: String,
}

#[derive(Debug, Deserialize)]
pub struct UserRegisterPayload {
    pub first_name: String,
    pub second_name: String,
    pub birthdate: String,
    #[serde(default)]
    pub biography: String,
    pub city: String,
    pub password: String,
}

fn check_length(field: &str, value: &str, max: usize) -> Result<String, ValidationError> {
    if value.graphemes(true).count() > max {
        return Err(ValidationError::new(format!("{} is too long", field)));
    }
    Ok(value.to_string())
}

impl User {
    pub fn new(
        first_name: &str,
        second_name: &str,
        birthdate: &str,
        biography: &str,
        city: &str,
    ) -> Result<User, ValidationError> {
        if first_name.trim().is_empty() || second_name.trim().is_empty() {
            return Err(ValidationError::new("first_name and second_name are required"));
        }
        Ok(User {
            id: Uuid::new_v4(),
            first_name: check_length("first_name", first_name, NAME_MAX_LENGTH)?,
            second_name: check_length("second_name", second_name, NAME_MAX_LENGTH)?,
            birthdate: match NaiveDate::parse_from_str(birthdate, "%Y-%m-%d") {
                Ok(birthdate) => birthdate,
                Err(e) => {
                    log::debug!("birthdate format is incorrect: {:?}", e);
                    return Err(ValidationError::new("birthdate format is incorrect, should be %Y-%m-%d"));
                }
            },
            biography: check_length("biography", biography, BIOGRAPHY_MAX_LENGTH)?,
            city: check_length("city", city, NAME_MAX_LENGTH)?,
        })
    }

    pub fn from_parts(
        id: Uuid,
        first_name: String,
        second_name: String,
        birthdate: NaiveDate,
        biography: String,
        city: String,
    ) -> User {
        User {
            id,
            first_name,
            second_name,
            birthdate,
            biography,
            city,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn second_name(&self) -> &str {
        &self.second_name
    }

    pub fn birthdate(&self) -> &NaiveDate {
        &self.birthdate
    }

    pub fn biography(&self) -> &str {
        &self.biography
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            first_name: self.first_name.clone(),
            second_name: self.second_name.clone(),
            city: self.city.clone(),
        }
    }
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let password_length = password.graphemes(true).count();
    if PASSWORD_MAX_LENGTH < password_length {
        return Err(ValidationError::new("password is too long"));
    } else if password_length < PASSWORD_MIN_LENGTH {
        return Err(ValidationError::new("password is too short"));
    }
    Ok(())
}

/// PHC string; the salt is embedded.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed_hash) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok(),
        Err(err) => {
            log::debug!("stored password hash is malformed: {:?}", err);
            false
        }
    }
}
