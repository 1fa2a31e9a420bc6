use lazy_static::lazy_static;
use regex::Regex;
use tonic::Status;
use uuid::Uuid;

use crate::grpc::pb;

const MIN_NAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;
const COUNTRY_LEN: usize = 2;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn require_min_len(field: &str, value: &str, min: usize) -> Result<(), Status> {
    if value.chars().count() < min {
        return Err(Status::invalid_argument(format!(
            "{field} must be at least {min} characters"
        )));
    }
    Ok(())
}

fn require_email(email: &str) -> Result<(), Status> {
    if !is_valid_email(email) {
        return Err(Status::invalid_argument("email must be a valid address"));
    }
    Ok(())
}

fn require_country(country: &str) -> Result<(), Status> {
    if country.chars().count() != COUNTRY_LEN {
        return Err(Status::invalid_argument(
            "country_iso_code must be exactly 2 characters",
        ));
    }
    Ok(())
}

pub(crate) fn require_user_id(id: &str) -> Result<(), Status> {
    if id.is_empty() || Uuid::parse_str(id).is_err() {
        return Err(Status::invalid_argument("id must be a valid uuid"));
    }
    Ok(())
}

pub(crate) fn validate_create_user(req: &pb::CreateUserRequest) -> Result<(), Status> {
    require_min_len("first_name", &req.first_name, MIN_NAME_LEN)?;
    require_min_len("last_name", &req.last_name, MIN_NAME_LEN)?;
    require_min_len("nick_name", &req.nick_name, MIN_NAME_LEN)?;
    require_email(&req.email)?;
    require_min_len("password", &req.password, MIN_PASSWORD_LEN)?;
    require_country(&req.country_iso_code)
}

pub(crate) fn validate_update_user(req: &pb::UpdateUserRequest) -> Result<(), Status> {
    require_user_id(&req.id)?;
    let user = req.user.clone().unwrap_or_default();
    require_min_len("first_name", &user.first_name, MIN_NAME_LEN)?;
    require_min_len("last_name", &user.last_name, MIN_NAME_LEN)?;
    require_min_len("nick_name", &user.nick_name, MIN_NAME_LEN)?;
    require_email(&user.email)?;
    require_country(&user.country_iso_code)
}

pub(crate) fn validate_list_users(req: &pb::ListUsersRequest) -> Result<(), Status> {
    if req.limit < 1 {
        return Err(Status::invalid_argument("limit must be at least 1"));
    }
    Ok(())
}
