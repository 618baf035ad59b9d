#[tokio::main]
async fn main() {
    media_service::server::run_from_env().await;
}
