//! Form validation
//!
//! Each form collects every field error before returning so clients can
//! show them together. Checks that need the database (duplicate username
//! or email) live in the handlers.

use crate::db::submissions::SubmissionFields;
use crate::error::ValidationErrors;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_USERNAME: &str =
    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";

pub const USERNAME_MAX: usize = 150;
pub const EMAIL_MAX: usize = 254;
pub const NAME_MAX: usize = 128;
pub const COUNTRY_MAX: usize = 48;
pub const AFFILIATION_MAX: usize = 32;
pub const TITLE_MAX: usize = 128;
pub const SHORT_DESCRIPTION_MAX: usize = 32;

const MAX_SIMILARITY: f64 = 0.7;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9@.+_-]+$").unwrap_or_else(|e| panic!("invalid username pattern: {}", e))
});

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$"#,
    )
    .unwrap_or_else(|e| panic!("invalid email pattern: {}", e))
});

static NON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\W+").unwrap_or_else(|e| panic!("invalid split pattern: {}", e)));

/// Usernames that cannot be registered
pub static RESERVED_USERNAMES: &[&str] = &[
    "abuse", "account", "accounts", "admin", "administrator", "anonymous", "api", "auth",
    "committee", "contact", "help", "hostmaster", "info", "login", "logout", "mail", "media",
    "moderator", "noreply", "no-reply", "null", "password", "postmaster", "profile", "register",
    "reviews", "root", "security", "signup", "staff", "static", "submissions", "superuser",
    "support", "system", "undefined", "webmaster", "www",
];

/// Frequently used passwords, compared case-insensitively
static COMMON_PASSWORDS: &[&str] = &[
    "123456789012", "1234567890123", "123123123123", "111111111111", "000000000000",
    "passwordpassword", "password1234", "password12345", "password123456", "qwertyuiopasdf",
    "qwertyuiop123", "qwerty123456", "1q2w3e4r5t6y", "1qaz2wsx3edc", "abcdefghijkl",
    "abc123abc123", "iloveyou1234", "letmein12345", "welcome12345", "administrator",
    "trustno1trustno1", "monkeymonkey", "dragondragon", "footballfootball", "baseballbaseball",
    "superman1234", "sunshine1234", "princess1234", "changemenow1", "correcthorsebatterystaple",
    "aaaaaaaaaaaa", "asdfghjkl123", "zxcvbnm12345", "passw0rdpassw0rd", "p@ssw0rd1234",
];

fn char_len(value: &str) -> usize {
    value.chars().count()
}

fn check_max_length(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    let len = char_len(value);
    if len > max {
        errors.add(
            field,
            format!("Ensure this value has at most {} characters (it has {}).", max, len),
        );
    }
}

fn check_required(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, REQUIRED);
    } else {
        check_max_length(errors, field, value, max);
    }
}

fn check_email(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, REQUIRED);
    } else if char_len(value) > EMAIL_MAX {
        check_max_length(errors, field, value, EMAIL_MAX);
    } else if !is_valid_email(value) {
        errors.add(field, INVALID_EMAIL);
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

pub fn is_valid_username(value: &str) -> bool {
    !value.is_empty() && char_len(value) <= USERNAME_MAX && USERNAME_RE.is_match(value)
}

pub fn is_reserved_username(value: &str) -> bool {
    let lowered = value.to_lowercase();
    RESERVED_USERNAMES.contains(&lowered.as_str())
}

/// Password strength rules; `attributes` pairs a display name with a value
/// the password must not resemble
pub fn validate_password(password: &str, min_length: usize, attributes: &[(&str, &str)]) -> Vec<String> {
    let mut messages = Vec::new();
    let lowered = password.to_lowercase();

    for (display_name, value) in attributes {
        if value.is_empty() {
            continue;
        }
        let value = value.to_lowercase();
        let too_similar = NON_WORD_RE
            .split(&value)
            .chain(std::iter::once(value.as_str()))
            .filter(|part| !part.is_empty())
            .any(|part| strsim::normalized_levenshtein(&lowered, part) >= MAX_SIMILARITY);
        if too_similar {
            messages.push(format!("The password is too similar to the {}.", display_name));
            break;
        }
    }

    if char_len(password) < min_length {
        messages.push(format!(
            "This password is too short. It must contain at least {} characters.",
            min_length
        ));
    }

    if COMMON_PASSWORDS.contains(&lowered.trim()) {
        messages.push("This password is too common.".to_string());
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        messages.push("This password is entirely numeric.".to_string());
    }

    messages
}

/// Validate a new password pair, recording errors on `field2`
fn check_new_password(
    errors: &mut ValidationErrors,
    field1: &str,
    field2: &str,
    password1: &str,
    password2: &str,
    min_length: usize,
    attributes: &[(&str, &str)],
) {
    if password1.is_empty() {
        errors.add(field1, REQUIRED);
    }
    if password2.is_empty() {
        errors.add(field2, REQUIRED);
    }
    if password1.is_empty() || password2.is_empty() {
        return;
    }
    if password1 != password2 {
        errors.add(field2, PASSWORD_MISMATCH);
        return;
    }
    for message in validate_password(password2, min_length, attributes) {
        errors.add(field2, message);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
    pub name: String,
    pub country: String,
    pub affiliation: String,
}

impl SignupForm {
    /// Strip surrounding whitespace from the free-text fields
    pub fn trimmed(self) -> Self {
        Self {
            email: self.email.trim().to_string(),
            name: self.name.trim().to_string(),
            country: self.country.trim().to_string(),
            affiliation: self.affiliation.trim().to_string(),
            ..self
        }
    }

    pub fn validate(&self, min_password_length: usize) -> ValidationErrors {
        let mut errors = ValidationErrors::new();

        if self.username.is_empty() {
            errors.add("username", REQUIRED);
        } else if char_len(&self.username) > USERNAME_MAX {
            check_max_length(&mut errors, "username", &self.username, USERNAME_MAX);
        } else if !is_valid_username(&self.username) {
            errors.add("username", INVALID_USERNAME);
        }
        check_email(&mut errors, "email", &self.email);
        check_required(&mut errors, "name", &self.name, NAME_MAX);
        check_required(&mut errors, "country", &self.country, COUNTRY_MAX);
        check_max_length(&mut errors, "affiliation", &self.affiliation, AFFILIATION_MAX);

        check_new_password(
            &mut errors,
            "password1",
            "password2",
            &self.password1,
            &self.password2,
            min_password_length,
            &[
                ("username", self.username.as_str()),
                ("email address", self.email.as_str()),
                ("name", self.name.as_str()),
            ],
        );

        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.username.is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

impl PasswordChangeForm {
    pub fn validate(&self, min_password_length: usize, attributes: &[(&str, &str)]) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if self.old_password.is_empty() {
            errors.add("old_password", REQUIRED);
        }
        check_new_password(
            &mut errors,
            "new_password1",
            "new_password2",
            &self.new_password1,
            &self.new_password2,
            min_password_length,
            attributes,
        );
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordResetForm {
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SetPasswordForm {
    pub uid: String,
    pub token: String,
    pub new_password1: String,
    pub new_password2: String,
}

impl SetPasswordForm {
    pub fn validate(&self, min_password_length: usize, attributes: &[(&str, &str)]) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_new_password(
            &mut errors,
            "new_password1",
            "new_password2",
            &self.new_password1,
            &self.new_password2,
            min_password_length,
            attributes,
        );
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub name: String,
    pub country: String,
    pub affiliation: String,
    pub email: String,
}

impl ProfileForm {
    pub fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            country: self.country.trim().to_string(),
            affiliation: self.affiliation.trim().to_string(),
            email: self.email.trim().to_string(),
        }
    }

    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_required(&mut errors, "name", &self.name, NAME_MAX);
        check_required(&mut errors, "country", &self.country, COUNTRY_MAX);
        check_max_length(&mut errors, "affiliation", &self.affiliation, AFFILIATION_MAX);
        check_email(&mut errors, "email", &self.email);
        errors
    }
}

pub fn validate_submission_fields(fields: &SubmissionFields) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check_required(&mut errors, "title", &fields.title, TITLE_MAX);
    check_email(&mut errors, "contact_email", &fields.contact_email);
    errors
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewForm {
    pub expertise_score: Option<i64>,
    pub submission_score: Option<i64>,
    pub comments: String,
}

fn check_score(errors: &mut ValidationErrors, field: &str, score: Option<i64>) {
    match score {
        None => errors.add(field, REQUIRED),
        Some(s) if s < 1 => errors.add(field, "Ensure this value is greater than or equal to 1."),
        Some(s) if s > 5 => errors.add(field, "Ensure this value is less than or equal to 5."),
        Some(_) => {}
    }
}

impl ReviewForm {
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_score(&mut errors, "expertise_score", self.expertise_score);
        check_score(&mut errors, "submission_score", self.submission_score);
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HelpItemForm {
    pub short_description: String,
    pub content: String,
    pub lead: bool,
}

impl HelpItemForm {
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        check_required(&mut errors, "short_description", &self.short_description, SHORT_DESCRIPTION_MAX);
        errors
    }
}
