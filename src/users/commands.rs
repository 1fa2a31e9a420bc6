use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::db::{Executor, PgTx, TxManager};
use crate::domain::{Error, EventType, NewEvent, NewUser, UserUpdate};
use crate::outbox::repo::OutboxStore;
use crate::users::dto::{AddUserRequest, DeleteUserPayload, UpdateUserRequest};
use crate::users::password::{hash_password, validate_password};
use crate::users::repo::UserStoreCommands;

/// User mutations. Every mutation persists its outbox event in the same
/// transaction as the row change.
#[async_trait::async_trait]
pub trait UserCommands: Send + Sync {
    /// Creates a user and returns the assigned id.
    /// Fails with `InvalidPassword`, `UserAlreadyExists` or `Internal`.
    async fn create_user(&self, req: AddUserRequest) -> Result<Uuid, Error>;

    /// Full-row update. Fails with `InvalidUserId`, `UserNotFound` or
    /// `Internal`.
    async fn update_user(&self, req: UpdateUserRequest) -> Result<(), Error>;

    /// Fails with `InvalidUserId`, `UserNotFound` or `Internal`.
    async fn delete_user(&self, user_id: &str) -> Result<(), Error>;
}

pub struct UserCommandService {
    tx: TxManager,
    users: Arc<dyn UserStoreCommands>,
    outbox: Arc<dyn OutboxStore>,
}

impl UserCommandService {
    pub fn new(
        tx: TxManager,
        users: Arc<dyn UserStoreCommands>,
        outbox: Arc<dyn OutboxStore>,
    ) -> Self {
        Self { tx, users, outbox }
    }

    fn serialize_payload<T: serde::Serialize>(&self, payload: &T) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(payload).map_err(|err| {
            warn!(error = %err, "failed to serialize outbox payload");
            Error::Internal
        })
    }
}

#[async_trait::async_trait]
impl UserCommands for UserCommandService {
    async fn create_user(&self, req: AddUserRequest) -> Result<Uuid, Error> {
        validate_password(&req.password)?;
        let password_hash = hash_password(&req.password).map_err(|err| {
            warn!(error = %err, "password hashing failed");
            Error::InvalidPassword
        })?;

        let payload = self.serialize_payload(&req)?;
        let user = NewUser {
            first_name: req.first_name,
            last_name: req.last_name,
            nickname: req.nickname,
            email: req.email,
            country_iso_code: req.country_iso_code,
            password_hash,
        };

        let users = Arc::clone(&self.users);
        let outbox = Arc::clone(&self.outbox);
        let result = self
            .tx
            .run_in_tx(move |tx: &mut PgTx| {
                Box::pin(async move {
                    let mut db = Executor::Tx(tx);
                    let user_id = users.save(&mut db, &user).await?;
                    outbox
                        .add_event(
                            &mut db,
                            &NewEvent {
                                event_type: EventType::CreateUser,
                                payload,
                            },
                        )
                        .await?;
                    Ok(user_id)
                })
            })
            .await;

        match result {
            Err(Error::UserAlreadyExists) => Err(Error::UserAlreadyExists),
            Err(err) => {
                warn!(error = %err, "create user failed");
                Err(Error::Internal)
            }
            Ok(user_id) => Ok(user_id),
        }
    }

    async fn update_user(&self, req: UpdateUserRequest) -> Result<(), Error> {
        let user_id = Uuid::parse_str(&req.id).map_err(|_| Error::InvalidUserId)?;

        let payload = self.serialize_payload(&req)?;
        let user = UserUpdate {
            id: user_id,
            first_name: req.first_name,
            last_name: req.last_name,
            nickname: req.nickname,
            email: req.email,
            country_iso_code: req.country_iso_code,
        };

        let users = Arc::clone(&self.users);
        let outbox = Arc::clone(&self.outbox);
        let result = self
            .tx
            .run_in_tx(move |tx: &mut PgTx| {
                Box::pin(async move {
                    let mut db = Executor::Tx(tx);
                    users.update(&mut db, &user).await?;
                    outbox
                        .add_event(
                            &mut db,
                            &NewEvent {
                                event_type: EventType::UpdateUser,
                                payload,
                            },
                        )
                        .await?;
                    Ok(())
                })
            })
            .await;

        match result {
            Err(Error::UserNotFound) => Err(Error::UserNotFound),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "update user failed");
                Err(Error::Internal)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), Error> {
        let id = Uuid::parse_str(user_id).map_err(|_| Error::InvalidUserId)?;

        let payload = self.serialize_payload(&DeleteUserPayload {
            id: user_id.to_owned(),
        })?;

        let users = Arc::clone(&self.users);
        let outbox = Arc::clone(&self.outbox);
        let result = self
            .tx
            .run_in_tx(move |tx: &mut PgTx| {
                Box::pin(async move {
                    let mut db = Executor::Tx(tx);
                    users.delete(&mut db, id).await?;
                    outbox
                        .add_event(
                            &mut db,
                            &NewEvent {
                                event_type: EventType::DeleteUser,
                                payload,
                            },
                        )
                        .await?;
                    Ok(())
                })
            })
            .await;

        match result {
            Err(Error::UserNotFound) => Err(Error::UserNotFound),
            Err(err) => {
                warn!(user_id = %id, error = %err, "delete user failed");
                Err(Error::Internal)
            }
            Ok(()) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingUserStore {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl UserStoreCommands for CountingUserStore {
        async fn save(&self, _db: &mut Executor<'_>, _user: &NewUser) -> Result<Uuid, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::new_v4())
        }

        async fn update(&self, _db: &mut Executor<'_>, _user: &UserUpdate) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete(&self, _db: &mut Executor<'_>, _user_id: Uuid) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingOutbox {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OutboxStore for CountingOutbox {
        async fn add_event(
            &self,
            _db: &mut Executor<'_>,
            _event: &NewEvent,
        ) -> Result<Uuid, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::new_v4())
        }

        async fn claim_unprocessed(
            &self,
            _db: &mut Executor<'_>,
            _limit: i64,
        ) -> Result<Vec<crate::domain::Event>, Error> {
            Ok(Vec::new())
        }

        async fn mark_processed(&self, _db: &mut Executor<'_>, _id: Uuid) -> Result<(), Error> {
            Ok(())
        }
    }

    fn service() -> (
        UserCommandService,
        Arc<CountingUserStore>,
        Arc<CountingOutbox>,
    ) {
        let users = Arc::new(CountingUserStore::default());
        let outbox = Arc::new(CountingOutbox::default());
        let service = UserCommandService::new(
            TxManager::connect_lazy_for_tests(),
            Arc::clone(&users) as Arc<dyn UserStoreCommands>,
            Arc::clone(&outbox) as Arc<dyn OutboxStore>,
        );
        (service, users, outbox)
    }

    fn add_request(password: &str) -> AddUserRequest {
        AddUserRequest {
            first_name: "first".into(),
            last_name: "last".into(),
            nickname: "nick".into(),
            email: "e@x.pt".into(),
            password: password.into(),
            country_iso_code: "PT".into(),
        }
    }

    #[tokio::test]
    async fn create_user_rejects_a_bad_password_before_any_store_call() {
        let (service, users, outbox) = service();
        let err = service.create_user(add_request("P")).await.unwrap_err();
        assert_eq!(err, Error::InvalidPassword);
        assert_eq!(users.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outbox.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn update_user_rejects_a_malformed_id_before_any_store_call() {
        let (service, users, outbox) = service();
        let err = service
            .update_user(UpdateUserRequest {
                id: "not-a-uuid".into(),
                first_name: "first".into(),
                last_name: "last".into(),
                nickname: "nick".into(),
                email: "e@x.pt".into(),
                country_iso_code: "PT".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, Error::InvalidUserId);
        assert_eq!(users.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outbox.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delete_user_rejects_a_malformed_id_before_any_store_call() {
        let (service, users, outbox) = service();
        assert_eq!(
            service.delete_user("42").await.unwrap_err(),
            Error::InvalidUserId
        );
        assert_eq!(users.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outbox.calls.load(Ordering::SeqCst), 0);
    }
}
