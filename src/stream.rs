//! # Streaming Report Loop
//!
//! Drives one reporter over an unbounded stream of records, optionally
//! writing intermediate reports on a fixed cadence, until the stream ends or
//! a stop signal arrives.
//!
//! ## Scheduling
//!
//! Each iteration services exactly one event, checked in strict priority
//! order:
//!
//! 1. **Stop signal**: leave the loop without consuming more input
//! 2. **Report tick**: clear the sink if it is interactive, then write an
//!    intermediate report
//! 3. **Input**: add the next decoded record, leave the loop at end of
//!    stream, or abort on a decode error
//!
//! A high-rate input therefore never starves a shutdown request or a due
//! report. Ticks missed while the loop was busy are skipped, not replayed.
//!
//! Decoding happens on a dedicated reader thread feeding a bounded channel,
//! so a read blocked on an idle input does not hold up the stop signal or the
//! timer. All aggregation and rendering stays on the calling task. After a
//! stop the reader is left behind rather than joined, so it may still hold
//! the input open when [`run`] returns.
//!
//! ## Finalization
//!
//! After a stop signal or the end of the stream the reporter is closed and
//! one final report is written. A decode error skips finalization entirely;
//! write errors always propagate.

use crate::cli::ReportConfig;
use crate::decoder::{self, Decoder};
use crate::error::{DecodeError, ReportError};
use crate::output::{Output, ReportSink};
use crate::record::Record;
use crate::reporter::{AnyReporter, Reporter};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Records buffered between the reader thread and the loop
const CHANNEL_CAPACITY: usize = 1024;

/// Why the loop stopped consuming input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Signal,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: StopReason,
    /// Records added to the reporter
    pub records: u64,
    /// Intermediate reports written before the final one
    pub snapshots: u64,
}

/// Periodic report timer, never firing when no interval is configured
struct ReportTicker {
    inner: Option<Interval>,
}

impl ReportTicker {
    fn new(every: Option<Duration>) -> Self {
        let inner = every.filter(|d| !d.is_zero()).map(|every| {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        Self { inner }
    }

    async fn tick(&mut self) {
        match &mut self.inner {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

/// Decode `decoder` to completion on its own thread.
///
/// The channel closes at a clean end of stream; a decode error is sent as the
/// last item. The thread is detached: once the receiver is dropped it exits
/// on its next send, but a `decode` call blocked on an idle input (stdin, a
/// pipe) keeps that input open until it returns or the process exits.
fn spawn_reader<D>(
    mut decoder: D,
) -> Result<mpsc::Receiver<Result<Record, DecodeError>>, ReportError>
where
    D: Decoder + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    std::thread::Builder::new()
        .name("record-reader".to_string())
        .spawn(move || loop {
            let item = match decoder.decode() {
                Ok(Some(record)) => Ok(record),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        })
        .map_err(DecodeError::Io)?;

    Ok(rx)
}

/// Run `reporter` over every record `decoder` yields.
///
/// `every` enables intermediate reports; `stop` resolves when the caller
/// wants the run to end early. Returns once the final report is written.
pub async fn run<R, D, W, S>(
    reporter: &mut R,
    decoder: D,
    out: &mut W,
    every: Option<Duration>,
    stop: S,
) -> Result<RunSummary, ReportError>
where
    R: Reporter + ?Sized,
    D: Decoder + Send + 'static,
    W: ReportSink,
    S: Future<Output = ()>,
{
    let mut records = spawn_reader(decoder)?;
    let mut ticker = ReportTicker::new(every);
    tokio::pin!(stop);

    let mut added: u64 = 0;
    let mut snapshots: u64 = 0;

    let reason = loop {
        tokio::select! {
            biased;

            _ = &mut stop => break StopReason::Signal,
            _ = ticker.tick() => {
                out.clear_screen()?;
                reporter.report(&mut *out)?;
                snapshots += 1;
                debug!("Wrote intermediate report #{} after {} records", snapshots, added);
            }
            item = records.recv() => match item {
                Some(Ok(record)) => {
                    reporter.add(&record);
                    added += 1;
                }
                Some(Err(e)) => return Err(e.into()),
                None => break StopReason::EndOfStream,
            },
        }
    };

    match reason {
        StopReason::Signal => warn!("Stop requested after {} records, writing final report", added),
        StopReason::EndOfStream => debug!("End of input after {} records", added),
    }

    reporter.close();
    reporter.report(&mut *out)?;

    Ok(RunSummary {
        reason,
        records: added,
        snapshots,
    })
}

/// Run a complete report as described by `config`.
///
/// The reporter is built first so configuration errors surface before any
/// input or output is opened.
pub async fn report<S>(config: &ReportConfig, stop: S) -> Result<RunSummary, ReportError>
where
    S: Future<Output = ()>,
{
    let mut reporter = AnyReporter::from_config(config)?;
    let inputs = decoder::open_inputs(&config.inputs)?;
    let mut output = Output::open(&config.output)?;

    info!(
        "Generating {} report from {} input(s) to {}",
        config.kind,
        config.inputs.len(),
        output.describe()
    );
    if let Some(every) = config.every {
        info!("Writing intermediate reports every {:?}", every);
    }

    let summary = run(&mut reporter, inputs, &mut output, config.every, stop).await?;

    info!(
        "Report complete: {} records, {} intermediate reports",
        summary.records, summary.snapshots
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;
    use std::io::{self, Write};
    use tokio::sync::oneshot;

    fn fixed_reporter() -> AnyReporter {
        AnyReporter::Histogram(Histogram::fixed("[0,1ms,10ms]".parse().unwrap()))
    }

    fn counts(reporter: &AnyReporter) -> Vec<u64> {
        match reporter {
            AnyReporter::Histogram(histogram) => histogram.counts().to_vec(),
            other => panic!("unexpected reporter {:?}", other),
        }
    }

    /// Yields the given latencies, then either ends or fails
    struct Scripted {
        latencies: std::vec::IntoIter<Duration>,
        fail_at_end: bool,
    }

    impl Scripted {
        fn new(latencies_us: &[u64]) -> Self {
            Self {
                latencies: latencies_us
                    .iter()
                    .map(|&us| Duration::from_micros(us))
                    .collect::<Vec<_>>()
                    .into_iter(),
                fail_at_end: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail_at_end = true;
            self
        }
    }

    impl Decoder for Scripted {
        fn decode(&mut self) -> Result<Option<Record>, DecodeError> {
            match self.latencies.next() {
                Some(latency) => Ok(Some(Record::with_latency(latency))),
                None if self.fail_at_end => Err(DecodeError::Csv {
                    line: 4,
                    reason: "truncated record".to_string(),
                }),
                None => Ok(None),
            }
        }
    }

    /// Never ends, optionally pausing before each record
    struct Unbounded {
        delay: Duration,
    }

    impl Decoder for Unbounded {
        fn decode(&mut self) -> Result<Option<Record>, DecodeError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            Ok(Some(Record::with_latency(Duration::from_micros(500))))
        }
    }

    /// Produces nothing until its sender is dropped, then ends the stream
    struct Idle {
        wake: std::sync::mpsc::Receiver<()>,
    }

    impl Idle {
        fn new() -> (std::sync::mpsc::Sender<()>, Self) {
            let (tx, wake) = std::sync::mpsc::channel();
            (tx, Self { wake })
        }
    }

    impl Decoder for Idle {
        fn decode(&mut self) -> Result<Option<Record>, DecodeError> {
            let _ = self.wake.recv();
            Ok(None)
        }
    }

    /// Fires a stop signal once the wrapped reporter has seen `limit` records
    struct StopAfter {
        inner: AnyReporter,
        limit: u64,
        stop: Option<oneshot::Sender<()>>,
    }

    impl StopAfter {
        fn new(inner: AnyReporter, limit: u64) -> (Self, impl Future<Output = ()>) {
            let (tx, rx) = oneshot::channel();
            let reporter = Self {
                inner,
                limit,
                stop: Some(tx),
            };
            (reporter, async move {
                let _ = rx.await;
            })
        }
    }

    impl Reporter for StopAfter {
        fn add(&mut self, record: &Record) {
            self.inner.add(record);
            if self.inner.records() >= self.limit {
                if let Some(tx) = self.stop.take() {
                    let _ = tx.send(());
                }
            }
        }

        fn report(&self, out: &mut dyn Write) -> Result<(), ReportError> {
            self.inner.report(out)
        }

        fn close(&mut self) {
            self.inner.close();
        }
    }

    /// Interactive sink counting how often it was cleared
    #[derive(Default)]
    struct Screen {
        buf: Vec<u8>,
        clears: u64,
    }

    impl Write for Screen {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buf.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ReportSink for Screen {
        fn is_interactive(&self) -> bool {
            true
        }

        fn clear_screen(&mut self) -> io::Result<()> {
            self.clears += 1;
            Ok(())
        }
    }

    /// Sink whose writes always fail
    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ReportSink for Broken {}

    #[tokio::test]
    async fn test_end_of_stream_writes_final_report() {
        let mut reporter = fixed_reporter();
        let mut out = Vec::new();

        let summary = run(
            &mut reporter,
            Scripted::new(&[500, 2_000, 50_000]),
            &mut out,
            None,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.snapshots, 0);
        assert_eq!(counts(&reporter), vec![1, 1, 1]);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Bucket").count(), 1);
        assert!(text.contains("[10ms, +Inf]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_takes_priority() {
        let mut reporter = fixed_reporter();
        let mut out = Vec::new();
        let (_hold, idle) = Idle::new();
        let every = Duration::from_millis(10);
        let start = Instant::now();

        // The stop and the first tick share a deadline. With the clock paused
        // both fire in the same advance, so one loop iteration sees both due.
        let summary = run(
            &mut reporter,
            idle,
            &mut out,
            Some(every),
            tokio::time::sleep(every),
        )
        .await
        .unwrap();

        assert!(Instant::now() >= start + every);
        assert_eq!(summary.reason, StopReason::Signal);
        assert_eq!(summary.records, 0);
        assert_eq!(summary.snapshots, 0);
        assert_eq!(counts(&reporter), vec![0, 0, 0]);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Bucket").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_tick_runs_before_input() {
        let mut reporter = fixed_reporter();
        let mut screen = Screen::default();
        let (_hold, idle) = Idle::new();
        let every = Duration::from_millis(10);

        let stop = tokio::time::sleep(every * 3 + every / 2);
        let summary = run(&mut reporter, idle, &mut screen, Some(every), stop)
            .await
            .unwrap();

        assert_eq!(summary.reason, StopReason::Signal);
        assert_eq!(summary.snapshots, 3);
        assert_eq!(screen.clears, 3);
        assert_eq!(summary.records, 0);
    }

    #[tokio::test]
    async fn test_stop_after_three_records_of_unbounded_stream() {
        let (mut reporter, stop) = StopAfter::new(AnyReporter::Histogram(Histogram::auto()), 3);
        let decoder = Unbounded {
            delay: Duration::ZERO,
        };
        let mut out = Vec::new();

        let summary = run(&mut reporter, decoder, &mut out, None, stop)
            .await
            .unwrap();

        assert_eq!(summary.reason, StopReason::Signal);
        assert_eq!(summary.records, 3);

        // Closed on finalization: only the populated bucket remains.
        assert_eq!(counts(&reporter.inner), vec![3]);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("100.00%"));
    }

    #[tokio::test]
    async fn test_decode_error_aborts_without_final_report() {
        let mut reporter = fixed_reporter();
        let mut out = Vec::new();

        let err = run(
            &mut reporter,
            Scripted::new(&[500, 2_000]).failing(),
            &mut out,
            None,
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReportError::Decode(DecodeError::Csv { line: 4, .. })));
        assert!(out.is_empty());
        assert_eq!(reporter.records(), 2);
    }

    #[tokio::test]
    async fn test_write_error_propagates() {
        let mut reporter = fixed_reporter();

        let err = run(
            &mut reporter,
            Scripted::new(&[500]),
            &mut Broken,
            None,
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ReportError::Write(_)));
    }

    #[tokio::test]
    async fn test_periodic_reports_clear_interactive_sink() {
        let (mut reporter, stop) = StopAfter::new(AnyReporter::Histogram(Histogram::auto()), 20);
        let decoder = Unbounded {
            delay: Duration::from_millis(5),
        };
        let mut screen = Screen::default();

        let summary = run(
            &mut reporter,
            decoder,
            &mut screen,
            Some(Duration::from_millis(10)),
            stop,
        )
        .await
        .unwrap();

        assert!(summary.snapshots >= 1);
        assert_eq!(screen.clears, summary.snapshots);

        let text = String::from_utf8(screen.buf).unwrap();
        assert_eq!(text.matches("Bucket").count() as u64, summary.snapshots + 1);
        assert_eq!(summary.records, 20);
        assert_eq!(reporter.inner.records(), 20);
    }

    #[tokio::test]
    async fn test_intermediate_reports_do_not_close_histogram() {
        let (mut reporter, stop) = StopAfter::new(AnyReporter::Histogram(Histogram::auto()), 10);
        let decoder = Unbounded {
            delay: Duration::from_millis(2),
        };
        let mut out = Vec::new();

        let summary = run(&mut reporter, decoder, &mut out, Some(Duration::from_millis(3)), stop)
            .await
            .unwrap();

        assert!(summary.snapshots >= 1);

        // Intermediate reports keep the trailing empty bucket; only the final
        // one is pruned.
        let text = String::from_utf8(out).unwrap();
        let sections: Vec<&str> = text.split("Bucket").skip(1).collect();
        assert_eq!(sections.len() as u64, summary.snapshots + 1);
        assert!(sections[0].contains("[1ms, +Inf]"));
        assert!(sections[sections.len() - 1].contains("[0s, +Inf]"));
        assert_eq!(counts(&reporter.inner), vec![10]);
    }
}
