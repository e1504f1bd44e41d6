//! 将 `tracing` 输出转发到浏览器控制台。

use std::io;
use std::str::FromStr;

use tracing_subscriber::filter::LevelFilter;

/// 缓存一条格式化后的事件，在 drop 时交给 `console.log`。
#[derive(Debug, Default)]
pub struct ConsoleWriter {
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer);
        web_sys::console::log_1(&line.trim_end().into());
    }
}

pub fn parse_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|value| LevelFilter::from_str(value).ok())
        .unwrap_or(LevelFilter::INFO)
}

/// 安装控制台订阅器。重复调用时保留第一个订阅器。
pub fn init(level: Option<&str>) {
    let result = tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_writer(ConsoleWriter::default)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .try_init();
    if result.is_err() {
        tracing::debug!("console subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level(Some("chatty")), LevelFilter::INFO);
        assert_eq!(parse_level(None), LevelFilter::INFO);
        assert_eq!(parse_level(Some("debug")), LevelFilter::DEBUG);
    }
}
