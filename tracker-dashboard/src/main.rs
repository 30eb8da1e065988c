#[tokio::main]
async fn main() -> tracker_dashboard_lib::Result {
    tracker_dashboard_lib::run().await
}
