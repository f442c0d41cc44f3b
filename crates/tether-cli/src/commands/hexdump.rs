//! Raw memory dump for checking offsets by eye.
//!
//! ```text
//! 0x000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
//! ```

use anyhow::{Context, Result};
use tether::{ProcessId, ProcessProvider, RemoteMemory, SystemProvider};

use super::hex_utils::parse_hex_address;

pub fn run(address: &str, size: usize, pid: Option<u32>, process: &str, ascii: bool) -> Result<()> {
    let address = parse_hex_address(address)?;
    let provider = SystemProvider::new();
    let pid = match pid {
        Some(pid) => ProcessId(pid),
        None => provider
            .find_process(process)
            .with_context(|| format!("{process} is not running"))?,
    };

    let handle = provider.open(pid)?;
    let bytes = handle.read_bytes(address, size)?;

    println!("Hexdump of pid {} at {:#X} ({} bytes):", pid, address, size);
    println!();
    for line in format_lines(&bytes, ascii) {
        println!("{line}");
    }
    Ok(())
}

fn format_lines(bytes: &[u8], ascii: bool) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("0x{:03X}: ", i * 16);
            for j in 0..16 {
                if j == 8 {
                    line.push(' ');
                }
                match chunk.get(j) {
                    Some(byte) => line.push_str(&format!("{byte:02X} ")),
                    None => line.push_str("   "),
                }
            }
            if ascii {
                let text: String = chunk
                    .iter()
                    .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' })
                    .collect();
                line.push_str(&format!(" |{text:<16}|"));
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_line() {
        let lines = format_lines(b"Hello World\0\0\0\0\0", true);
        assert_eq!(
            lines,
            ["0x000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|"]
        );
    }

    #[test]
    fn test_short_line_is_padded() {
        let lines = format_lines(&[0xAB; 18], false);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].len(), lines[0].len());
        assert!(lines[1].starts_with("0x010: AB AB "));
    }
}
