//! Ingestion of the CSV-like memory trace the core treats as an external
//! collaborator. Rows are `op, addr_hex, size, bits?`; only `size == "64"`
//! rows are ever forwarded to [`crate::tagmemory::TagMemory`].

use log::*;
use scan_fmt::scan_fmt;
use std::io::BufRead;

use crate::error::TraceError;
use crate::tagmemory::Request;

/// One parsed row of the trace, before the `size == 64` filter is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRow {
    pub write: bool,
    pub addr: u64,
    pub size: u32,
    /// '0'/'1' bits from the trace, one per tagged 8-byte word. Empty for
    /// reads.
    pub tags: Vec<u8>,
}

fn parse_addr(field: &str) -> Option<u64> {
    let field = field.trim();
    let hex = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")).unwrap_or(field);
    u64::from_str_radix(hex, 16).ok()
}

fn bits_to_tags(bits: &str) -> Vec<u8> {
    bits.trim().bytes().map(|b| if b == b'0' { 0 } else { 1 }).collect()
}

/// Parses one trace line. Returns `None` for blank or malformed lines rather
/// than erroring: a trace is expected to carry occasional junk rows, and a
/// replay should silently drop anything that isn't a recognized request.
pub fn parse_row(line: &str) -> Option<TraceRow> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Ok((op, addr_hex, size, bits)) =
        scan_fmt!(line, "{[^,]},{[^,]},{[^,]},{[^,]}", String, String, String, String)
    {
        let addr = parse_addr(&addr_hex)?;
        let size: u32 = size.trim().parse().ok()?;
        let write = op.trim() == "W";
        let tags = if write { bits_to_tags(&bits) } else { Vec::new() };
        return Some(TraceRow { write, addr, size, tags });
    }

    if let Ok((op, addr_hex, size)) = scan_fmt!(line, "{[^,]},{[^,]},{[^,]}", String, String, String) {
        let addr = parse_addr(&addr_hex)?;
        let size: u32 = size.trim().parse().ok()?;
        return Some(TraceRow { write: op.trim() == "W", addr, size, tags: Vec::new() });
    }

    debug!("skipping unparsable trace line: {:?}", line);
    None
}

/// Streams [`Request`]s out of a trace, dropping rows whose `size` isn't 64
/// bytes and logging (rather than failing on) malformed rows.
pub struct TraceReader<R> {
    lines: std::io::Lines<R>,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> TraceReader<R> {
        TraceReader { lines: reader.lines() }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<Request, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            match parse_row(&line) {
                Some(row) if row.size == 64 => {
                    return Some(Ok(Request { write: row.write, addr: row.addr, tags: row.tags }));
                }
                Some(_) => continue, // non-64-byte request, not our concern
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_write_row() {
        let row = parse_row("W,0x80000000,64,11111111").unwrap();
        assert!(row.write);
        assert_eq!(row.addr, 0x80000000);
        assert_eq!(row.size, 64);
        assert_eq!(row.tags, vec![1, 1, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn parses_a_read_row_without_bits() {
        let row = parse_row("R,0x80000040,64").unwrap();
        assert!(!row.write);
        assert_eq!(row.addr, 0x80000040);
        assert_eq!(row.size, 64);
        assert!(row.tags.is_empty());
    }

    #[test]
    fn rejects_a_malformed_row() {
        assert!(parse_row("garbage").is_none());
        assert!(parse_row("").is_none());
    }

    #[test]
    fn reader_filters_non_64_byte_requests() {
        let data = "W,0x80000000,64,11111111\nW,0x80000040,32,1111\nR,0x80000080,64\n";
        let reader = TraceReader::new(std::io::Cursor::new(data));
        let requests: Vec<Request> = reader.filter_map(Result::ok).collect();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].write);
        assert!(!requests[1].write);
    }
}
