#[tokio::main]
async fn main() {
    if let Err(e) = kiangombe_lib::run().await {
        eprintln!("kiangombe: {e}");
        std::process::exit(1);
    }
}
