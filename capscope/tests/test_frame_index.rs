use capscope::capture::{ByteOrder, CaptureWriter, IndexStop, Record};
use capscope::domain::{CaptureError, Pid, Timestamp};
use capscope::Document;
use capscope_common::{context, HEADER_SIZE};

fn load(writer: CaptureWriter) -> Document {
    Document::from_bytes(writer.finish()).expect("capture should load")
}

#[test]
fn test_frames_are_time_ordered_and_stable() {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.add_exit(30, 0, 3);
    w.add_exit(10, 0, 1);
    w.add_exit(20, 0, 2);
    // equal timestamps keep file order
    w.add_exit(40, 0, 7);
    w.add_exit(40, 0, 8);
    w.add_exit(40, 0, 9);
    let doc = load(w);

    let pids: Vec<i32> = doc.frames().map(|f| f.pid().0).collect();
    assert_eq!(pids, vec![1, 2, 3, 7, 8, 9]);
    let times: Vec<Timestamp> = doc.frames().map(|f| f.time()).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_longer_mark_precedes_nested_marks_at_same_time() {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.add_mark(50, 0, 1, 10, "app", "inner", "");
    w.add_exit(50, 0, 1);
    w.add_mark(50, 0, 1, 100, "app", "outer", "");
    w.add_mark(5, 0, 1, 1, "app", "early", "");
    let doc = load(w);

    let order: Vec<String> = doc
        .frames()
        .map(|f| match f.record {
            Record::Mark(mark) => mark.name.to_string(),
            Record::Exit => "exit".to_string(),
            _ => "other".to_string(),
        })
        .collect();
    // marks only trade places among the slots marks occupy
    assert_eq!(order, vec!["early", "outer", "exit", "inner"]);
}

#[test]
fn test_categories_partition_the_frames() {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.add_process(1, 0, 10, "/usr/bin/app");
    w.add_map(2, 0, 10, 0x1000, 0x2000, 0, 1, "/usr/bin/app");
    w.add_sample(3, 0, 10, 10, &[0x1100]);
    w.add_sample(4, 0, 10, 10, &[context::KERNEL, 0xffff_ffff_8100_0000, context::USER, 0x1100]);
    w.add_allocation(5, 0, 10, 11, 0xdead_0000, 64, &[0x1200]);
    w.add_fork(6, 0, 10, 12);
    w.add_exit(7, 0, 12);
    w.add_jitmap(8, 0, 10, &[]);
    w.add_mark(9, 0, 10, 1, "g", "n", "m");
    w.add_log(10, 0, 10, 4, "app", "hello");
    w.add_metadata(11, 0, 10, "key", "value");
    w.add_file(12, 0, -1, "/etc/hostname", b"box\n");
    w.add_overlay(13, 0, 10, 0, "/var/lib/rt", "/usr");
    let doc = load(w);

    let c = doc.categories();
    let disjoint = [
        &c.samples,
        &c.allocations,
        &c.processes,
        &c.memory_maps,
        &c.marks,
        &c.counter_definitions,
        &c.counter_sets,
        &c.file_chunks,
        &c.jitmaps,
        &c.overlays,
        &c.exits,
        &c.forks,
        &c.logs,
        &c.metadata,
        &c.unknown,
    ];
    let total: usize = disjoint.iter().map(|index| index.len()).sum();
    assert_eq!(total, doc.len());

    for position in 0..u32::try_from(doc.len()).unwrap() {
        let owners = disjoint.iter().filter(|index| index.contains(position)).count();
        assert_eq!(owners, 1, "frame {position} belongs to {owners} categories");
    }

    assert_eq!(c.traceables, c.samples.union(&c.allocations));
    assert_eq!(doc.samples_with_context_switch().len(), 1);
    assert_eq!(doc.samples_without_context_switch().len(), 1);
    assert!(c.samples_with_context_switch.subtract(&c.samples).is_empty());
    assert_eq!(doc.pids().collect::<Vec<_>>(), vec![Pid(10), Pid(12)]);
}

#[test]
fn test_both_byte_orders_load_the_same_document() {
    let build = |order: ByteOrder| {
        let mut w = CaptureWriter::new(order, 1_000);
        w.add_process(1_100, 2, 42, "/usr/bin/server --port 80");
        w.add_map(1_200, 2, 42, 0x40_0000, 0x48_0000, 0x1000, 77, "/usr/bin/server");
        w.add_sample(1_300, 2, 42, 43, &[0x40_0100, 0x40_0200]);
        w.add_mark(1_400, 2, 42, 250, "net", "request", "GET /");
        w.set_end_time(2_000);
        load(w)
    };

    let little = build(ByteOrder::Little);
    let big = build(ByteOrder::Big);
    assert_ne!(little.is_native(), big.is_native());

    for doc in [&little, &big] {
        assert_eq!(doc.time_span().begin, Timestamp(1_000));
        assert_eq!(doc.len(), 4);

        let sample = doc.samples().get(0).unwrap();
        assert_eq!(sample.time(), Timestamp(1_300));
        assert_eq!(sample.header.cpu, 2);
        let addresses: Vec<u64> = sample.addresses().unwrap().iter().collect();
        assert_eq!(addresses, vec![0x40_0100, 0x40_0200]);

        let process = doc.process_info(Pid(42)).unwrap();
        assert_eq!(process.symbol().name(), "/usr/bin/server");
        let map = process.address_layout.lookup(0x40_0100).unwrap();
        assert_eq!((map.offset, map.inode), (0x1000, 77));

        let Record::Mark(mark) = doc.marks().get(0).unwrap().record else {
            panic!("expected a mark");
        };
        assert_eq!(mark.duration, 250);
        assert_eq!(mark.message, "GET /");
    }
}

#[test]
fn test_truncated_capture_keeps_complete_prefix() {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.add_process(1, 0, 5, "/bin/sh");
    w.add_sample(2, 0, 5, 5, &[0x1000, 0x2000]);
    w.add_sample(3, 0, 5, 5, &[0x1000, 0x2000, 0x3000]);
    let mut data = w.finish();
    let full_len = data.len();
    data.truncate(full_len - 8);

    let doc = Document::from_bytes(data).unwrap();
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.samples().len(), 1);
    assert!(matches!(doc.index_stop(), IndexStop::Truncated { .. }));
    assert_eq!(doc.process_info(Pid(5)).unwrap().symbol().name(), "/bin/sh");
}

#[test]
fn test_header_only_capture_is_empty() {
    let doc = load(CaptureWriter::new(ByteOrder::native(), 0));
    assert!(doc.is_empty());
    assert_eq!(doc.index_stop(), IndexStop::EndOfData);
    // the kernel pseudo-process always exists
    assert!(doc.process_info(Pid::KERNEL).is_some());
}

#[test]
fn test_short_header_is_rejected() {
    let err = Document::from_bytes(vec![0; HEADER_SIZE - 1]).unwrap_err();
    assert!(matches!(err, CaptureError::TooShort { len } if len == HEADER_SIZE - 1));
}
