// Only one test in this file calls an `init_*` function: tracing's global
// subscriber can be set at most once per process, and `cargo test` runs
// every test in this file in the same process.

#[test]
fn init_logging_without_otlp_endpoint_succeeds() {
    std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
    assert!(krakenhashes_otel::init_logging().is_ok());
}
