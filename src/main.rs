// Logs go to stderr or a file; stdout is reserved for the protocol.

#[tokio::main]
async fn main() {
    if let Err(e) = stock_mcp_bridge::run().await {
        if let Some(line) = stock_mcp_bridge::logging::report_fatal(&e) {
            eprintln!("{line}");
        }
        std::process::exit(1);
    }
}
