use clap::Parser;
use eventql::cli::Cli;
use eventql::server::Server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let server = match Server::bootstrap(&cli) {
        Ok(server) => server,
        Err(err) => {
            log::error!("failed to bootstrap server: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = server.serve().await {
        log::error!("server exited with error: {err}");
        std::process::exit(1);
    }
}
