pub mod handler;
pub mod validation;

/// Pre-generated protobuf types and service stubs for `users.v1`.
/// Regenerate from `proto/users/v1/users.proto` when the contract changes.
pub mod pb {
    #![allow(clippy::all)]
    include!("pb/users.v1.rs");
}

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::grpc::pb::user_service_server::UserServiceServer;
use crate::users::commands::UserCommands;
use crate::users::queries::UserQueries;

/// Serves the gRPC front-end until the shutdown future resolves.
pub async fn serve(
    addr: SocketAddr,
    commands: Arc<dyn UserCommands>,
    queries: Arc<dyn UserQueries>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<(), tonic::transport::Error> {
    let handler = handler::UserHandler::new(commands, queries);

    info!(%addr, "grpc server listening");
    tonic::transport::Server::builder()
        .add_service(UserServiceServer::new(handler))
        .serve_with_shutdown(addr, shutdown)
        .await
}
