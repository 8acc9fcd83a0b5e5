//! # Record Decoders
//!
//! Decoders turn an input stream into [`Record`]s one at a time. A decoder
//! distinguishes three outcomes: a record, a clean end of stream (`Ok(None)`)
//! and a real failure ([`DecodeError`]). The streaming loop treats only the
//! last one as fatal.
//!
//! ## Supported Encodings
//!
//! - **JSON lines**: one JSON object per line, blank lines ignored
//! - **CSV**: `timestamp,code,latency,bytes_out,bytes_in,error` followed by
//!   optional `body,attack,seq,method,url` columns. Timestamps are Unix
//!   nanoseconds and latencies are nanoseconds. Parsing is done by the `csv`
//!   crate, so quoted fields may span lines.
//!
//! [`open_decoder`] sniffs the first non-blank byte of an input to pick the
//! encoding, and [`MultiDecoder`] reads several inputs back to back.

use crate::error::{DecodeError, ReportError};
use crate::record::Record;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::fs::File;
use csv::{Position, StringRecord};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Input name meaning standard input
pub const STDIN: &str = "stdin";

/// Source of result records
pub trait Decoder {
    /// Decode the next record, or `Ok(None)` at a clean end of stream.
    fn decode(&mut self) -> Result<Option<Record>, DecodeError>;
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn decode(&mut self) -> Result<Option<Record>, DecodeError> {
        (**self).decode()
    }
}

/// Read lines, skipping blank ones, while tracking the line number.
struct LineReader<R> {
    reader: R,
    line: u64,
    buf: String,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Next non-blank line together with its 1-based line number.
    fn next_line(&mut self) -> io::Result<Option<(u64, &str)>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            if !self.buf.trim().is_empty() {
                return Ok(Some((self.line, self.buf.trim_end_matches(&['\r', '\n'][..]))));
            }
        }
    }
}

/// Decoder for newline-delimited JSON records
pub struct JsonDecoder<R> {
    lines: LineReader<R>,
}

impl<R: BufRead> JsonDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineReader::new(reader),
        }
    }
}

impl<R: BufRead> Decoder for JsonDecoder<R> {
    fn decode(&mut self) -> Result<Option<Record>, DecodeError> {
        let Some((line_no, line)) = self.lines.next_line()? else {
            return Ok(None);
        };
        serde_json::from_str(line)
            .map(Some)
            .map_err(|source| DecodeError::Json {
                line: line_no,
                source,
            })
    }
}

/// Decoder for CSV records
///
/// Quoted fields may contain commas, doubled quotes and line breaks. Rows
/// may carry any number of trailing optional columns.
pub struct CsvDecoder<R> {
    reader: csv::Reader<R>,
    record: StringRecord,
}

impl<R: Read> CsvDecoder<R> {
    pub fn new(reader: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        Self {
            reader,
            record: StringRecord::new(),
        }
    }
}

impl<R: Read> Decoder for CsvDecoder<R> {
    fn decode(&mut self) -> Result<Option<Record>, DecodeError> {
        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => return Ok(None),
                Ok(true) => {}
                Err(e) => {
                    let line = e.position().map(Position::line).unwrap_or(0);
                    let reason = e.to_string();
                    return match e.into_kind() {
                        csv::ErrorKind::Io(err) => Err(DecodeError::Io(err)),
                        _ => Err(DecodeError::Csv { line, reason }),
                    };
                }
            }

            // Whitespace-only lines are not records.
            if self.record.len() == 1 && self.record[0].trim().is_empty() {
                continue;
            }

            let line = self.record.position().map(Position::line).unwrap_or(0);
            return parse_csv_record(&self.record)
                .map(Some)
                .map_err(|reason| DecodeError::Csv { line, reason });
        }
    }
}

fn parse_csv_record(fields: &StringRecord) -> Result<Record, String> {
    if fields.len() < 6 {
        return Err(format!("expected at least 6 fields, found {}", fields.len()));
    }

    fn number<T: std::str::FromStr>(
        fields: &StringRecord,
        index: usize,
        name: &str,
    ) -> Result<T, String> {
        fields[index]
            .trim()
            .parse()
            .map_err(|_| format!("invalid {}: {:?}", name, &fields[index]))
    }

    let timestamp_ns: i64 = number(fields, 0, "timestamp")?;
    let latency_ns: u64 = number(fields, 2, "latency")?;
    let column = |index: usize| fields.get(index).unwrap_or_default().to_string();

    Ok(Record {
        timestamp: Utc.timestamp_nanos(timestamp_ns),
        code: number(fields, 1, "status code")?,
        latency: Duration::from_nanos(latency_ns),
        bytes_out: number(fields, 3, "bytes out")?,
        bytes_in: number(fields, 4, "bytes in")?,
        error: fields[5].to_string(),
        attack: column(7),
        seq: match fields.get(8) {
            Some(seq) if !seq.is_empty() => number(fields, 8, "sequence")?,
            _ => 0,
        },
        method: column(9),
        url: column(10),
    })
}

/// Reads several inputs one after another
pub struct MultiDecoder {
    decoders: VecDeque<Box<dyn Decoder + Send>>,
}

impl MultiDecoder {
    pub fn new(decoders: Vec<Box<dyn Decoder + Send>>) -> Self {
        Self {
            decoders: decoders.into(),
        }
    }
}

impl Decoder for MultiDecoder {
    fn decode(&mut self) -> Result<Option<Record>, DecodeError> {
        while let Some(current) = self.decoders.front_mut() {
            if let Some(record) = current.decode()? {
                return Ok(Some(record));
            }
            self.decoders.pop_front();
        }
        Ok(None)
    }
}

/// Pick a decoder for `reader` by looking at its first non-blank byte:
/// `{` selects JSON lines, anything else CSV.
pub fn sniff<R: BufRead + Send + 'static>(
    mut reader: R,
) -> Result<Box<dyn Decoder + Send>, DecodeError> {
    let json = loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break false;
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(pos) => break buf[pos] == b'{',
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    };

    if json {
        Ok(Box::new(JsonDecoder::new(reader)))
    } else {
        Ok(Box::new(CsvDecoder::new(reader)))
    }
}

/// Open `path` (or standard input for `stdin`) and sniff its encoding.
pub fn open_decoder(path: &Path) -> Result<Box<dyn Decoder + Send>, ReportError> {
    if path == Path::new(STDIN) {
        debug!("Reading results from standard input");
        return Ok(sniff(BufReader::new(io::stdin()))?);
    }

    let file = File::open(path).map_err(|source| ReportError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Reading results from {:?}", path);
    Ok(sniff(BufReader::new(file))?)
}

/// Open every input in order and chain them into one decoder.
pub fn open_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<MultiDecoder, ReportError> {
    let decoders = paths
        .iter()
        .map(|path| open_decoder(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MultiDecoder::new(decoders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn drain<D: Decoder>(decoder: &mut D) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(record) = decoder.decode().unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn test_json_decoder_skips_blank_lines() {
        let input = "{\"latency\":1000,\"code\":200}\n\n{\"latency\":2000,\"code\":500}\n";
        let mut decoder = JsonDecoder::new(Cursor::new(input));

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].latency, Duration::from_micros(2));
        assert_eq!(records[1].code, 500);
        assert!(decoder.decode().unwrap().is_none());
    }

    #[test]
    fn test_json_decoder_reports_line_of_bad_record() {
        let input = "{\"latency\":1000}\n\n{\"latency\":\n";
        let mut decoder = JsonDecoder::new(Cursor::new(input));

        assert!(decoder.decode().unwrap().is_some());
        match decoder.decode() {
            Err(DecodeError::Json { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_csv_decoder() {
        let input = "1700000000000000000,200,1500000,10,512,,,smoke,3,GET,http://localhost/\n\
                     1700000000500000000,0,0,0,0,\"dial tcp: connection refused, retry\"\n";
        let mut decoder = CsvDecoder::new(Cursor::new(input));

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].latency, Duration::from_micros(1500));
        assert_eq!(records[0].bytes_in, 512);
        assert_eq!(records[0].attack, "smoke");
        assert_eq!(records[0].seq, 3);
        assert_eq!(records[0].url, "http://localhost/");
        assert_eq!(records[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(records[1].error, "dial tcp: connection refused, retry");
        assert_eq!(records[1].code, 0);
    }

    #[test]
    fn test_csv_decoder_rejects_short_rows() {
        let mut decoder = CsvDecoder::new(Cursor::new("1,200,3\n"));
        assert!(matches!(
            decoder.decode(),
            Err(DecodeError::Csv { line: 1, .. })
        ));
    }

    #[test]
    fn test_csv_decoder_quoted_fields() {
        let input = "0,200,1000,0,0,\"say \"\"hi\"\"\"\n\
                     1,0,2000,0,0,\"read: connection reset\nby peer\"\n\
                     \n\
                     2,200,3000,0,0,\n";
        let mut decoder = CsvDecoder::new(Cursor::new(input));

        let records = drain(&mut decoder);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].error, "say \"hi\"");
        assert_eq!(records[1].error, "read: connection reset\nby peer");
        assert_eq!(records[2].latency, Duration::from_micros(3));
    }

    #[test]
    fn test_csv_decoder_reports_line_of_bad_record() {
        let input = "0,200,1000,0,0,\"multi\nline\"\n1,200,oops,0,0,\n";
        let mut decoder = CsvDecoder::new(Cursor::new(input));

        assert!(decoder.decode().unwrap().is_some());
        match decoder.decode() {
            Err(DecodeError::Csv { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("latency"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sniff_picks_encoding() {
        let mut json = sniff(Cursor::new("\n  {\"latency\":5}\n")).unwrap();
        assert_eq!(json.decode().unwrap().unwrap().latency, Duration::from_nanos(5));

        let mut csv = sniff(Cursor::new("0,200,7,0,0,\n")).unwrap();
        assert_eq!(csv.decode().unwrap().unwrap().latency, Duration::from_nanos(7));

        let mut empty = sniff(Cursor::new("")).unwrap();
        assert!(empty.decode().unwrap().is_none());
    }

    #[test]
    fn test_multi_decoder_chains_inputs() {
        let mut first = NamedTempFile::new().unwrap();
        writeln!(first, "{{\"latency\":1}}").unwrap();
        writeln!(first, "{{\"latency\":2}}").unwrap();
        let empty = NamedTempFile::new().unwrap();
        let mut second = NamedTempFile::new().unwrap();
        writeln!(second, "0,200,3,0,0,").unwrap();

        let mut decoder = open_inputs(&[first.path(), empty.path(), second.path()]).unwrap();
        let latencies: Vec<u64> = drain(&mut decoder)
            .iter()
            .map(|r| r.latency.as_nanos() as u64)
            .collect();
        assert_eq!(latencies, vec![1, 2, 3]);
    }

    #[test]
    fn test_open_missing_input_fails() {
        let Err(err) = open_decoder(Path::new("/definitely/not/here.json")) else {
            panic!("opening a missing input succeeded");
        };
        assert!(matches!(err, ReportError::Open { .. }));
    }
}
