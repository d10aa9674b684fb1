use capscope::capture::{ByteOrder, CaptureWriter};
use capscope::domain::{DocumentError, Pid};
use capscope::symbolization::{MultiSymbolizer, NoSymbolizer};
use capscope::symbols::{AddressContext, Symbol};
use capscope::Document;
use capscope_common::{context, JITMAP_MARK};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const KALLSYMS: &str = "\
ffffffff81000000 T _stext
ffffffff81001000 T do_syscall_64
ffffffff81002000 T schedule
";

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn write_capture(dir: &TempDir) -> std::path::PathBuf {
    let mut w = CaptureWriter::new(ByteOrder::native(), 1_000);
    w.set_capture_time("2026-10-15T09:30:00Z");
    w.add_file(1_000, 0, -1, "/proc/kallsyms.gz", &gzip(KALLSYMS.as_bytes()));
    w.add_file(1_001, 0, -1, "/etc/os-release", b"NAME=Test\n");
    w.add_process(1_010, 1, 200, "/usr/lib/jsrt --inspect app.js");
    w.add_map(1_020, 1, 200, 0x5000_0000, 0x5001_0000, 0, 3, "/nonexistent/usr/lib/jsrt");
    w.add_jitmap(1_030, 1, 200, &[(JITMAP_MARK | 1, "js::main"), (JITMAP_MARK | 2, "js::tick")]);
    w.add_sample(
        1_100,
        1,
        200,
        200,
        &[
            context::KERNEL,
            0xffff_ffff_8100_1010,
            0xffff_ffff_8100_2000,
            context::USER,
            JITMAP_MARK | 2,
            JITMAP_MARK | 1,
            0x5000_0400,
        ],
    );
    w.add_sample(1_200, 1, 200, 201, &[JITMAP_MARK | 2, JITMAP_MARK | 1]);
    w.add_allocation(1_300, 2, 200, 202, 0x7f00_0000, 4096, &[JITMAP_MARK | 1]);
    w.add_mark(1_400, 1, 200, 600, "runtime", "gc", "minor");
    w.add_mark(1_500, 1, 200, 200, "runtime", "gc", "minor");
    w.add_exit(2_500, 1, 200);
    w.set_end_time(3_000);

    let path = dir.path().join("trace.syscap");
    w.write_to(&path).unwrap();
    path
}

fn names(symbols: &[Symbol]) -> Vec<&str> {
    symbols.iter().map(Symbol::name).collect()
}

#[tokio::test]
async fn test_open_reports_progress_and_loads() {
    let dir = TempDir::new().unwrap();
    let path = write_capture(&dir);

    let stages = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&stages);
    let doc = Document::open_with_progress(&path, move |fraction, stage| {
        recorder.lock().unwrap().push((fraction, stage.to_string()));
    })
    .await
    .unwrap();

    let stages = stages.lock().unwrap();
    assert_eq!(stages.first().map(|(_, s)| s.as_str()), Some("Reading header"));
    assert_eq!(stages.last().map(|(f, s)| (*f, s.as_str())), Some((1.0, "Done")));
    assert!(stages.windows(2).all(|w| w[0].0 <= w[1].0));

    assert_eq!(doc.header().capture_time, "2026-10-15T09:30:00Z");
    assert_eq!(doc.samples().len(), 2);
    assert_eq!(doc.allocations().len(), 1);
    assert_eq!(doc.traceables().len(), 3);
    assert_eq!(doc.samples_with_context_switch().len(), 1);

    let process = doc.process_info(Pid(200)).unwrap();
    assert_eq!(process.symbol().name(), "/usr/lib/jsrt");
    assert_eq!(process.threads().map(|t| t.0).collect::<Vec<_>>(), vec![201, 202]);
    assert_eq!(process.exit_time.0, 2_500);
}

#[tokio::test]
async fn test_open_missing_file_is_an_open_error() {
    let dir = TempDir::new().unwrap();
    let err = Document::open(dir.path().join("missing.syscap")).await.unwrap_err();
    assert!(matches!(err, DocumentError::Open { .. }));
}

#[tokio::test]
async fn test_open_short_file_is_a_capture_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.syscap");
    std::fs::write(&path, b"not a capture").unwrap();
    let err = Document::open(&path).await.unwrap_err();
    assert!(matches!(err, DocumentError::Capture(_)));
}

#[tokio::test]
async fn test_embedded_files_and_marks() {
    let dir = TempDir::new().unwrap();
    let doc = Document::open(write_capture(&dir)).await.unwrap();

    assert_eq!(doc.list_files(), vec!["/etc/os-release", "/proc/kallsyms"]);
    let kallsyms = doc.lookup_file("/proc/kallsyms").unwrap();
    assert!(kallsyms.is_compressed());
    assert_eq!(kallsyms.read_to_string().unwrap(), KALLSYMS);
    assert!(doc.lookup_file("/proc/cpuinfo").is_none());

    let catalog = doc.catalog_marks();
    assert_eq!(catalog.len(), 1);
    let gc = &catalog[0].entries[0];
    assert_eq!((gc.group.as_str(), gc.name.as_str()), ("runtime", "gc"));
    assert_eq!((gc.count, gc.min, gc.max, gc.average), (2, 200, 600, 400));
    assert_eq!(doc.marks_by_group("runtime").len(), 2);
}

#[tokio::test]
async fn test_standard_symbolizers_resolve_kernel_and_jit_frames() {
    let dir = TempDir::new().unwrap();
    let doc = Arc::new(Document::open(write_capture(&dir)).await.unwrap());
    assert!(doc.lookup_symbol(Pid(200), AddressContext::User, JITMAP_MARK | 1).is_none());

    doc.symbolize(MultiSymbolizer::standard(), CancellationToken::new()).await.unwrap();

    let sample = doc.samples().get(0).unwrap();
    let (symbols, final_context) = doc.symbolize_traceable(&sample, 128);
    assert_eq!(
        names(&symbols),
        vec![
            "do_syscall_64",
            "schedule",
            "- - Kernel - -",
            "js::tick",
            "js::main",
            "In File /nonexistent/usr/lib/jsrt+0x400",
        ]
    );
    assert_eq!(final_context, AddressContext::User);
    assert_eq!(symbols[0].binary_nick(), Some("Kernel"));
    assert_eq!(symbols[3].binary_nick(), Some("JIT"));

    // depth limits the walk
    let (symbols, _) = doc.symbolize_traceable(&sample, 3);
    assert_eq!(names(&symbols), vec!["do_syscall_64", "schedule"]);

    let allocation = doc.allocations().get(0).unwrap();
    let (symbols, _) = doc.symbolize_traceable(&allocation, 128);
    assert_eq!(names(&symbols), vec!["js::main"]);

    // cached kernel ranges end where the next kallsyms entry begins
    let kernel = doc.lookup_symbol(Pid(200), AddressContext::Kernel, 0xffff_ffff_8100_1fff);
    assert_eq!(kernel.map(Symbol::name), Some("do_syscall_64"));
    assert!(doc.lookup_symbol(Pid(200), AddressContext::Kernel, 0xffff_ffff_8100_0010).is_none());
}

#[tokio::test]
async fn test_cancelled_symbolization_leaves_document_usable() {
    let dir = TempDir::new().unwrap();
    let doc = Arc::new(Document::open(write_capture(&dir)).await.unwrap());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = doc.symbolize(MultiSymbolizer::standard(), cancel).await.unwrap_err();
    assert!(matches!(err, DocumentError::Cancelled));
    assert!(!doc.is_symbolized());
    assert!(doc.lookup_symbol(Pid(200), AddressContext::User, JITMAP_MARK | 1).is_none());
    assert_eq!(doc.samples().len(), 2);

    doc.symbolize(NoSymbolizer, CancellationToken::new()).await.unwrap();
    assert!(doc.is_symbolized());
}
