use twingate_provider::provider::TwingateProvider;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    twingate_provider::init_logging();

    let provider = TwingateProvider::new(env!("CARGO_PKG_VERSION"));
    twingate_provider::serve(provider).await
}
