use phantom::config::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::from_args();
    phantom::run(config).await;
}
