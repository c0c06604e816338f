#[tokio::main]
async fn main() {
    if let Err(e) = certgen::run().await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
