#[actix_web::main]
async fn main() {
    if let Err(e) = sqlchat_lib::run().await {
        eprintln!("sqlchat: {}", e);
        std::process::exit(1);
    }
}
