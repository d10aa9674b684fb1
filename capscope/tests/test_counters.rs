use capscope::capture::{ByteOrder, CaptureWriter, CounterSpec, CounterType, CounterValue};
use capscope::domain::Timestamp;
use capscope::Document;

fn spec<'a>(id: u32, category: &'a str, name: &'a str, value: CounterValue) -> CounterSpec<'a> {
    CounterSpec { id, category, name, description: "test counter", value }
}

fn capture(order: ByteOrder) -> Document {
    let mut w = CaptureWriter::new(order, 0);
    w.define_counters(
        1,
        0,
        -1,
        &[
            spec(1, "Memory", "Resident", CounterValue::Int64(0)),
            spec(2, "CPU", "Total", CounterValue::Double(0.0)),
        ],
    );
    w.set_counters(
        10,
        0,
        -1,
        &[(1, CounterValue::Int64(0x0102_0304_0506_0708)), (2, CounterValue::Double(3.25))],
    );
    w.set_counters(20, 0, -1, &[(1, CounterValue::Int64(-42)), (2, CounterValue::Double(97.5))]);
    w.set_counters(30, 0, -1, &[(1, CounterValue::Int64(1))]);
    Document::from_bytes(w.finish()).unwrap()
}

#[test]
fn test_integer_counters_are_swapped_for_foreign_captures() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let doc = capture(order);
        let resident = doc.find_counter("Memory", "Resident").unwrap();
        assert_eq!(resident.counter_type(), CounterType::Int64);

        let values: Vec<CounterValue> = resident.values().iter().map(|v| v.value).collect();
        assert_eq!(
            values,
            vec![
                CounterValue::Int64(0x0102_0304_0506_0708),
                CounterValue::Int64(-42),
                CounterValue::Int64(1),
            ],
            "{order:?}"
        );
    }
}

#[test]
fn test_double_counters_are_never_swapped() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let doc = capture(order);
        let total = doc.find_counter("CPU", "Total").unwrap();
        assert_eq!(total.counter_type(), CounterType::Double);
        let values: Vec<CounterValue> = total.values().iter().map(|v| v.value).collect();
        assert_eq!(values, vec![CounterValue::Double(3.25), CounterValue::Double(97.5)]);
        assert_eq!(total.min(), 3.25);
        assert_eq!(total.max(), 97.5);
    }
}

#[test]
fn test_series_times_and_metadata() {
    let doc = capture(ByteOrder::native());
    assert_eq!(doc.counters().len(), 2);

    let resident = &doc.counters()[0];
    assert_eq!(resident.id(), 1);
    assert_eq!(resident.category(), "Memory");
    assert_eq!(resident.description(), "test counter");
    let times: Vec<Timestamp> = resident.values().iter().map(|v| v.time).collect();
    assert_eq!(times, vec![Timestamp(10), Timestamp(20), Timestamp(30)]);
    #[allow(clippy::cast_precision_loss)]
    let expected_max = 0x0102_0304_0506_0708_i64 as f64;
    assert_eq!(resident.max(), expected_max);
    assert_eq!(resident.min(), -42.0);
}

#[test]
fn test_many_values_in_one_set() {
    let mut w = CaptureWriter::new(ByteOrder::Big, 0);
    let specs: Vec<CounterSpec<'_>> = (1..=12)
        .map(|id| CounterSpec {
            id,
            category: "Disk",
            name: "Queue",
            description: "",
            value: CounterValue::Int64(0),
        })
        .collect();
    w.define_counters(1, 0, -1, &specs);
    let values: Vec<(u32, CounterValue)> =
        (1..=12).map(|id| (id, CounterValue::Int64(i64::from(id) * 100))).collect();
    w.set_counters(2, 0, -1, &values);
    let doc = Document::from_bytes(w.finish()).unwrap();

    assert_eq!(doc.counters().len(), 12);
    for counter in doc.counters() {
        assert_eq!(counter.values()[0].value, CounterValue::Int64(i64::from(counter.id()) * 100));
    }
}

#[test]
fn test_redefined_id_feeds_latest_definition() {
    let mut w = CaptureWriter::new(ByteOrder::native(), 0);
    w.define_counters(1, 0, -1, &[spec(5, "Net", "Old", CounterValue::Int64(0))]);
    w.set_counters(2, 0, -1, &[(5, CounterValue::Int64(1))]);
    w.define_counters(3, 0, -1, &[spec(5, "Net", "New", CounterValue::Int64(0))]);
    w.set_counters(4, 0, -1, &[(5, CounterValue::Int64(2))]);
    let doc = Document::from_bytes(w.finish()).unwrap();

    // definitions are all read before any set
    assert!(doc.find_counter("Net", "Old").unwrap().is_empty());
    assert_eq!(doc.find_counter("Net", "New").unwrap().len(), 2);
}
