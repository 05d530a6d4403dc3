#[tokio::main]
async fn main() {
    if let Err(e) = quadro_backend::run().await {
        log::error!("{}", e);
        eprintln!("quadro-backend: {}", e);
        std::process::exit(1);
    }
}
