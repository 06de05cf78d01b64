use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::constants::BYTES_PER_KIB;

pub fn setup_logging(verbosity: &str) -> Result<()> {
    let level = match verbosity {
        "silent" => Level::ERROR,
        "normal" => Level::INFO,
        "verbose" => Level::DEBUG,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(format!("sluice={}", level).parse()?);

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

pub fn format_bytes(bytes: i64) -> String {
    if bytes < 0 {
        return format!("-{}", format_bytes(-bytes));
    }
    if bytes == 1 {
        return "1 Byte".to_string();
    }

    const UNITS: &[&str] = &["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{} Bytes", bytes);
    }

    let mut size = bytes as f64 / BYTES_PER_KIB;
    let mut unit_index = 0;
    while size >= BYTES_PER_KIB && unit_index < UNITS.len() - 1 {
        size /= BYTES_PER_KIB;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(1), "1 Byte");
        assert_eq!(format_bytes(2), "2 Bytes");
        assert_eq!(format_bytes(1023), "1023 Bytes");
        assert_eq!(format_bytes(1024), "1.00 KiB");
        assert_eq!(format_bytes(1048576), "1.00 MiB");
        assert_eq!(format_bytes(1073741824), "1.00 GiB");
    }

    #[test]
    fn test_format_bytes_negative() {
        assert_eq!(format_bytes(-1), "-1 Byte");
        assert_eq!(format_bytes(-2048), "-2.00 KiB");
    }
}
