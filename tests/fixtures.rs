#![allow(dead_code)]
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, Once};

use jiff::Timestamp;
use trace_correlator::hexdump::format_hexdump;
use trace_correlator::{Guid, MANIFEST_EVENT_ID, TraceRecord};

static LOGGER_INIT: Once = Once::new();

/// CLI tests that spawn the binary share the build directory; keep them sequential.
pub static CLI_TEST_LOCK: Mutex<()> = Mutex::new(());

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
pub fn ensure_env_logger_initialized() {
    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

pub const APP_PROVIDER: &str = "6c5a1f3e-8b2d-4e7a-9c1b-0d3e5f7a9b2c";
pub const OTHER_PROVIDER: &str = "0f0e0d0c-0b0a-0908-0706-050403020100";

pub const LINE_X: &str = "b7c1f1a2-3d4e-4f50-8a61-72839405a6b7";
pub const LINE_Y: &str = "c8d2e3f4-a5b6-4c7d-8e9f-a0b1c2d3e4f5";

pub const MANIFEST: &str = r#"<instrumentationManifest xmlns="http://schemas.microsoft.com/win/2004/08/events">
 <instrumentation xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:win="http://manifests.microsoft.com/win/2004/08/windows/events">
  <events xmlns="http://schemas.microsoft.com/win/2004/08/events">
   <provider name="Bank-Importer" guid="{6c5a1f3e-8b2d-4e7a-9c1b-0d3e5f7a9b2c}" resourceFileName="Bank-Importer" messageFileName="Bank-Importer" symbol="BankImporter">
    <events>
     <event value="12" version="0" level="win:Informational" symbol="FileStarted" task="FileStarted" template="FileStartedArgs"/>
     <event value="13" version="0" level="win:Informational" symbol="LineReceived" task="LineReceived" template="LineReceivedArgs"/>
     <event value="14" version="0" level="win:Informational" symbol="LineDataParsed" task="LineDataParsed" template="LineDataParsedArgs"/>
     <event value="21" version="0" level="win:Error" symbol="FileFailed" task="FileFailed" template="FileFailedArgs"/>
     <event value="22" version="0" level="win:Error" symbol="LineFailed" task="LineFailed" template="LineFailedArgs"/>
     <event value="23" version="0" level="win:Error" symbol="LineDataFailed" task="LineDataFailed" template="LineDataFailedArgs"/>
    </events>
    <templates>
     <template tid="FileStartedArgs"><data name="fileName" inType="win:UnicodeString"/></template>
     <template tid="LineReceivedArgs">
      <data name="fileName" inType="win:UnicodeString"/>
      <data name="line" inType="win:UnicodeString"/>
      <data name="lineCode" inType="win:GUID"/>
     </template>
     <template tid="LineDataParsedArgs">
      <data name="fileName" inType="win:UnicodeString"/>
      <data name="lineCode" inType="win:GUID"/>
      <data name="conta" inType="win:Int32"/>
      <data name="valor" inType="win:UnicodeString"/>
      <data name="descricao" inType="win:UnicodeString"/>
     </template>
     <template tid="FileFailedArgs"><data name="fileName" inType="win:UnicodeString"/></template>
     <template tid="LineFailedArgs">
      <data name="fileName" inType="win:UnicodeString"/>
      <data name="lineCode" inType="win:GUID"/>
     </template>
     <template tid="LineDataFailedArgs">
      <data name="fileName" inType="win:UnicodeString"/>
      <data name="lineCode" inType="win:GUID"/>
     </template>
    </templates>
   </provider>
  </events>
 </instrumentation>
 <localization>
  <resources culture="pt-BR">
   <stringTable>
    <string id="event_FileStarted" value="Importando arquivo %1"/>
    <string id="event_LineDataParsed" value="Conta %3, valor %4 (%5)"/>
    <string id="event_LineFailed" value="Linha %2 de %1 falhou"/>
   </stringTable>
  </resources>
 </localization>
</instrumentationManifest>"#;

pub fn app_provider() -> Guid {
    APP_PROVIDER.parse().unwrap()
}

pub fn at(seconds: i64) -> Timestamp {
    Timestamp::from_second(1_709_287_200 + seconds).unwrap()
}

/// A record whose payload is `payload` preceded by the noise bytes a real dump carries.
pub fn record(provider: Guid, event_id: u16, seconds: i64, payload: &str) -> TraceRecord {
    let mut bytes = vec![0x00, 0x00, 0x01, 0x02, b'#'];
    bytes.extend_from_slice(payload.as_bytes());
    TraceRecord::new(provider, event_id, at(seconds), format_hexdump(&bytes))
}

pub fn manifest_record(seconds: i64) -> TraceRecord {
    record(app_provider(), MANIFEST_EVENT_ID, seconds, MANIFEST)
}

pub fn file_started(seconds: i64, file: &str) -> TraceRecord {
    record(
        app_provider(),
        12,
        seconds,
        &serde_json::json!({ "fileName": file }).to_string(),
    )
}

pub fn line_received(seconds: i64, file: &str, line_code: &str, line: &str) -> TraceRecord {
    record(
        app_provider(),
        13,
        seconds,
        &serde_json::json!({ "fileName": file, "line": line, "lineCode": line_code }).to_string(),
    )
}

pub fn line_data_parsed(
    seconds: i64,
    file: &str,
    line_code: &str,
    conta: i64,
    valor: &str,
    descricao: &str,
) -> TraceRecord {
    record(
        app_provider(),
        14,
        seconds,
        &format!(
            r#"{{"fileName":{},"lineCode":"{}","conta":{},"valor":{},"descricao":{}}}"#,
            serde_json::json!(file),
            line_code,
            conta,
            valor,
            serde_json::json!(descricao)
        ),
    )
}

pub fn line_stage(event_id: u16, seconds: i64, file: &str, line_code: &str) -> TraceRecord {
    record(
        app_provider(),
        event_id,
        seconds,
        &serde_json::json!({ "fileName": file, "lineCode": line_code }).to_string(),
    )
}

pub fn write_capture(path: &Path, records: &[TraceRecord]) {
    let mut f = std::fs::File::create(path).unwrap();
    for r in records {
        writeln!(f, "{}", serde_json::to_string(r).unwrap()).unwrap();
    }
}
