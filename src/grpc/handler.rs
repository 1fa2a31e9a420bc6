use std::sync::Arc;

use time::OffsetDateTime;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::domain::{Error, User, UserSearchFilters};
use crate::grpc::pb;
use crate::grpc::pb::user_service_server::UserService;
use crate::grpc::validation;
use crate::users::commands::UserCommands;
use crate::users::dto::{AddUserRequest, ListUsersRequest, UpdateUserRequest};
use crate::users::queries::UserQueries;

/// Maps a domain error kind onto the wire status.
pub fn status_from_error(err: Error) -> Status {
    match err {
        Error::UserNotFound => Status::not_found(err.to_string()),
        Error::UserAlreadyExists => Status::already_exists(err.to_string()),
        Error::InvalidPassword
        | Error::InvalidUserId
        | Error::InvalidPaginationCursor
        | Error::EmptyRequest => Status::invalid_argument(err.to_string()),
        Error::Internal | Error::FailedToProcessData | Error::NotificationNotSent => {
            Status::internal(err.to_string())
        }
    }
}

fn complete<T>(method: &'static str, result: Result<T, Status>) -> Result<Response<T>, Status> {
    match result {
        Ok(value) => {
            debug!(method, "grpc call ok");
            Ok(Response::new(value))
        }
        Err(status) => {
            info!(method, error = %status, "grpc call failed");
            Err(status)
        }
    }
}

fn timestamp(t: OffsetDateTime) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: t.unix_timestamp(),
        nanos: t.nanosecond() as i32,
    }
}

fn readable_user(user: User) -> pb::ReadableUserFields {
    pb::ReadableUserFields {
        id: user.id.to_string(),
        first_name: user.first_name,
        last_name: user.last_name,
        nick_name: user.nickname,
        email: user.email,
        country_iso_code: user.country_iso_code,
        created_at: Some(timestamp(user.created_at)),
        updated_at: Some(timestamp(user.updated_at)),
    }
}

pub struct UserHandler {
    commands: Arc<dyn UserCommands>,
    queries: Arc<dyn UserQueries>,
}

impl UserHandler {
    pub fn new(commands: Arc<dyn UserCommands>, queries: Arc<dyn UserQueries>) -> Self {
        Self { commands, queries }
    }
}

#[tonic::async_trait]
impl UserService for UserHandler {
    async fn create_user(
        &self,
        request: Request<pb::CreateUserRequest>,
    ) -> Result<Response<pb::UserId>, Status> {
        let req = request.into_inner();
        let result = async {
            validation::validate_create_user(&req)?;
            let user_id = self
                .commands
                .create_user(AddUserRequest {
                    first_name: req.first_name,
                    last_name: req.last_name,
                    nickname: req.nick_name,
                    email: req.email,
                    password: req.password,
                    country_iso_code: req.country_iso_code,
                })
                .await
                .map_err(status_from_error)?;
            Ok(pb::UserId {
                id: user_id.to_string(),
            })
        }
        .await;
        complete("CreateUser", result)
    }

    async fn update_user(
        &self,
        request: Request<pb::UpdateUserRequest>,
    ) -> Result<Response<pb::UserId>, Status> {
        let req = request.into_inner();
        let result = async {
            validation::validate_update_user(&req)?;
            let user = req.user.unwrap_or_default();
            self.commands
                .update_user(UpdateUserRequest {
                    id: req.id.clone(),
                    first_name: user.first_name,
                    last_name: user.last_name,
                    nickname: user.nick_name,
                    email: user.email,
                    country_iso_code: user.country_iso_code,
                })
                .await
                .map_err(status_from_error)?;
            Ok(pb::UserId { id: req.id })
        }
        .await;
        complete("UpdateUser", result)
    }

    async fn delete_user(
        &self,
        request: Request<pb::UserId>,
    ) -> Result<Response<pb::UserId>, Status> {
        let req = request.into_inner();
        let result = async {
            validation::require_user_id(&req.id)?;
            self.commands
                .delete_user(&req.id)
                .await
                .map_err(status_from_error)?;
            Ok(pb::UserId { id: req.id })
        }
        .await;
        complete("DeleteUser", result)
    }

    async fn get_user(
        &self,
        request: Request<pb::UserId>,
    ) -> Result<Response<pb::UserResponse>, Status> {
        let req = request.into_inner();
        let result = async {
            validation::require_user_id(&req.id)?;
            let user = self
                .queries
                .get_user(&req.id)
                .await
                .map_err(status_from_error)?;
            Ok(pb::UserResponse {
                user: Some(readable_user(user)),
            })
        }
        .await;
        complete("GetUser", result)
    }

    async fn list_users(
        &self,
        request: Request<pb::ListUsersRequest>,
    ) -> Result<Response<pb::ListUsersResponse>, Status> {
        let req = request.into_inner();
        let result = async {
            // A nil message on the original wire decodes to the all-default
            // message here.
            if req == pb::ListUsersRequest::default() {
                return Err(status_from_error(Error::EmptyRequest));
            }
            validation::validate_list_users(&req)?;

            let cursor = (!req.cursor.is_empty()).then(|| req.cursor.clone());
            let (users, next_cursor) = self
                .queries
                .list_users(ListUsersRequest {
                    cursor,
                    limit: i64::from(req.limit),
                    filters: UserSearchFilters {
                        first_name: req.first_name,
                        last_name: req.last_name,
                        nickname: req.nick_name,
                        email: req.email,
                        country_iso_code: req.country_iso_code,
                    },
                })
                .await
                .map_err(status_from_error)?;

            Ok(pb::ListUsersResponse {
                users: users.into_iter().map(readable_user).collect(),
                next_cursor: next_cursor.unwrap_or_default(),
            })
        }
        .await;
        complete("ListUsers", result)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    struct FakeCommands {
        result: Result<Uuid, Error>,
    }

    #[async_trait::async_trait]
    impl UserCommands for FakeCommands {
        async fn create_user(&self, _req: AddUserRequest) -> Result<Uuid, Error> {
            self.result
        }

        async fn update_user(&self, _req: UpdateUserRequest) -> Result<(), Error> {
            self.result.map(|_| ())
        }

        async fn delete_user(&self, _user_id: &str) -> Result<(), Error> {
            self.result.map(|_| ())
        }
    }

    struct FakeQueries {
        users: Vec<User>,
        next_cursor: Option<String>,
        error: Option<Error>,
    }

    #[async_trait::async_trait]
    impl UserQueries for FakeQueries {
        async fn get_user(&self, _user_id: &str) -> Result<User, Error> {
            match &self.error {
                Some(err) => Err(*err),
                None => Ok(self.users[0].clone()),
            }
        }

        async fn list_users(
            &self,
            _req: ListUsersRequest,
        ) -> Result<(Vec<User>, Option<String>), Error> {
            match &self.error {
                Some(err) => Err(*err),
                None => Ok((self.users.clone(), self.next_cursor.clone())),
            }
        }
    }

    fn handler(commands: FakeCommands, queries: FakeQueries) -> UserHandler {
        UserHandler::new(Arc::new(commands), Arc::new(queries))
    }

    fn ok_commands() -> FakeCommands {
        FakeCommands {
            result: Ok(Uuid::parse_str("c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3").unwrap()),
        }
    }

    fn empty_queries() -> FakeQueries {
        FakeQueries {
            users: vec![],
            next_cursor: None,
            error: None,
        }
    }

    fn sample_user() -> User {
        User {
            id: Uuid::parse_str("c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3").unwrap(),
            first_name: "first".into(),
            last_name: "last".into(),
            nickname: "nick".into(),
            email: "e@x.pt".into(),
            country_iso_code: "PT".into(),
            created_at: datetime!(2024-08-22 20:00:00 UTC),
            updated_at: datetime!(2024-08-22 20:09:11.938220 UTC),
        }
    }

    fn create_request() -> pb::CreateUserRequest {
        pb::CreateUserRequest {
            first_name: "first".into(),
            last_name: "last".into(),
            nick_name: "nick".into(),
            email: "e@x.pt".into(),
            password: "Password1!".into(),
            country_iso_code: "PT".into(),
        }
    }

    #[tokio::test]
    async fn create_user_returns_the_new_id() {
        let handler = handler(ok_commands(), empty_queries());
        let resp = handler
            .create_user(Request::new(create_request()))
            .await
            .unwrap();
        assert_eq!(resp.into_inner().id, "c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3");
    }

    #[tokio::test]
    async fn create_user_rejects_invalid_fields_before_the_service() {
        let handler = handler(
            FakeCommands {
                result: Err(Error::Internal),
            },
            empty_queries(),
        );
        let mut req = create_request();
        req.country_iso_code = "PRT".into();
        let status = handler
            .create_user(Request::new(req))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn duplicate_create_maps_to_already_exists() {
        let handler = handler(
            FakeCommands {
                result: Err(Error::UserAlreadyExists),
            },
            empty_queries(),
        );
        let status = handler
            .create_user(Request::new(create_request()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
        assert_eq!(status.message(), "user already exists");
    }

    #[tokio::test]
    async fn update_missing_user_maps_to_not_found() {
        let handler = handler(
            FakeCommands {
                result: Err(Error::UserNotFound),
            },
            empty_queries(),
        );
        let status = handler
            .update_user(Request::new(pb::UpdateUserRequest {
                id: "c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3".into(),
                user: Some(pb::UpdatableUserFields {
                    first_name: "first".into(),
                    last_name: "last".into(),
                    nick_name: "nick".into(),
                    email: "e@x.pt".into(),
                    country_iso_code: "PT".into(),
                }),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn get_user_converts_timestamps() {
        let handler = handler(
            ok_commands(),
            FakeQueries {
                users: vec![sample_user()],
                next_cursor: None,
                error: None,
            },
        );
        let resp = handler
            .get_user(Request::new(pb::UserId {
                id: "c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3".into(),
            }))
            .await
            .unwrap();

        let user = resp.into_inner().user.expect("user");
        assert_eq!(user.nick_name, "nick");
        let updated_at = user.updated_at.expect("updated_at");
        assert_eq!(
            updated_at.seconds,
            sample_user().updated_at.unix_timestamp()
        );
        assert_eq!(updated_at.nanos, 938_220_000);
    }

    #[tokio::test]
    async fn list_users_with_an_empty_request_is_rejected() {
        let handler = handler(ok_commands(), empty_queries());
        let status = handler
            .list_users(Request::new(pb::ListUsersRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(status.message(), "empty request");
    }

    #[tokio::test]
    async fn list_users_returns_users_and_cursor() {
        let handler = handler(
            ok_commands(),
            FakeQueries {
                users: vec![sample_user()],
                next_cursor: Some("cursor123".into()),
                error: None,
            },
        );
        let resp = handler
            .list_users(Request::new(pb::ListUsersRequest {
                limit: 1,
                ..Default::default()
            }))
            .await
            .unwrap();

        let resp = resp.into_inner();
        assert_eq!(resp.users.len(), 1);
        assert_eq!(resp.next_cursor, "cursor123");
    }

    #[tokio::test]
    async fn internal_failures_map_to_internal_status() {
        let handler = handler(
            ok_commands(),
            FakeQueries {
                users: vec![],
                next_cursor: None,
                error: Some(Error::Internal),
            },
        );
        let status = handler
            .list_users(Request::new(pb::ListUsersRequest {
                limit: 1,
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
