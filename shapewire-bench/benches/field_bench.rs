//! Field marshaling benchmarks for the JSON, XML and query encoders.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shapewire_protocol::decode::{decode_into, decode_push};
use shapewire_protocol::encode::encode_value_list;
use shapewire_protocol::{
    FieldDecoder, FieldEncoder, FieldMarshaler, FieldUnmarshaler, JsonEncoder, JsonPayloadCodec,
    ListDecoder,
    Metadata, PayloadUnmarshaler, ProtocolError, QueryEncoder, Target, Value, ValueKind,
    XmlEncoder,
};

#[derive(Default)]
struct Record {
    id: Option<String>,
    size: Option<i64>,
    tags: Vec<String>,
    body: Option<String>,
}

fn create_test_record(body_size: usize) -> Record {
    Record {
        id: Some("r-12345".into()),
        size: Some(body_size as i64),
        tags: (0..8).map(|i| format!("tag-{i}")).collect(),
        body: Some("x \"quoted\" <tag> & ".repeat(body_size / 20 + 1)),
    }
}

impl FieldMarshaler for Record {
    fn marshal_fields(&self, e: &mut dyn FieldEncoder) -> Result<(), ProtocolError> {
        let meta = Metadata::default();
        if let Some(v) = &self.id {
            e.set_value(Target::Body, "Id", &Value::from(v), &meta);
        }
        if let Some(v) = self.size {
            e.set_value(Target::Body, "Size", &Value::Int64(v), &meta);
        }
        e.set_list(Target::Body, "Tags", &mut encode_value_list(&self.tags), &meta);
        if let Some(v) = &self.body {
            e.set_value(Target::Body, "Body", &Value::from(v), &meta);
        }
        Ok(())
    }
}

impl FieldUnmarshaler for Record {
    fn unmarshal_fields(&mut self, d: &mut dyn FieldDecoder) -> Result<(), ProtocolError> {
        let meta = Metadata::default();
        d.get(Target::Body, "Id", ValueKind::String, &mut decode_into(&mut self.id), &meta);
        d.get(Target::Body, "Size", ValueKind::Int64, &mut decode_into(&mut self.size), &meta);
        let tags = &mut self.tags;
        d.get_list(
            Target::Body,
            "Tags",
            &mut |ld: &mut dyn ListDecoder| ld.list_get(ValueKind::String, &mut decode_push(tags)),
            &meta,
        );
        d.get(Target::Body, "Body", ValueKind::String, &mut decode_into(&mut self.body), &meta);
        Ok(())
    }
}

fn bench_json_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_encode");

    for size in [100, 1000, 10000] {
        let record = create_test_record(size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            b.iter(|| black_box(JsonEncoder::encode_fields(record).unwrap()));
        });
    }

    group.finish();
}

fn bench_json_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_decode");

    for size in [100, 1000, 10000] {
        let encoded = JsonEncoder::encode_fields(&create_test_record(size))
            .unwrap()
            .unwrap_or_default();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut record = Record::default();
                JsonPayloadCodec.unmarshal_payload(encoded, &mut record).unwrap();
                black_box(record.tags.len())
            });
        });
    }

    group.finish();
}

fn bench_xml_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("xml_encode");

    for size in [100, 1000, 10000] {
        let record = create_test_record(size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            b.iter(|| black_box(XmlEncoder::encode_fields(record).unwrap()));
        });
    }

    group.finish();
}

fn bench_query_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_encode");

    for size in [100, 1000] {
        let record = create_test_record(size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            b.iter(|| black_box(QueryEncoder::encode_fields(record).unwrap().encode()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_json_encode,
    bench_json_decode,
    bench_xml_encode,
    bench_query_encode,
);

criterion_main!(benches);
