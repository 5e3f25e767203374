//! Web server command.

use console::style;

use crate::config::Settings;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;

/// Start the web server.
pub async fn cmd_serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let (host, port) = parse_bind_address(bind);

    println!(
        "{} Starting receiptd at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Uploads: {}", settings.uploads_dir.display());
    println!("  Charts:  {}", settings.analysis_images_dir.display());
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, &format!("{}:{}", host, port)).await
}

/// Parse a bind address that can be:
/// - Just a port: "5000" -> 127.0.0.1:5000
/// - Just a host: "0.0.0.0" -> 0.0.0.0:5000
/// - Host and port: "0.0.0.0:5000" -> 0.0.0.0:5000
fn parse_bind_address(bind: &str) -> (String, u16) {
    if let Ok(port) = bind.parse::<u16>() {
        return (DEFAULT_HOST.to_string(), port);
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return (host.to_string(), port);
        }
    }

    (bind.to_string(), DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bind_address() {
        assert_eq!(parse_bind_address("8080"), ("127.0.0.1".to_string(), 8080));
        assert_eq!(parse_bind_address("0.0.0.0"), ("0.0.0.0".to_string(), 5000));
        assert_eq!(
            parse_bind_address("0.0.0.0:3000"),
            ("0.0.0.0".to_string(), 3000)
        );
    }
}
