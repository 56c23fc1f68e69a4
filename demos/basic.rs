//! Basic usage example for the ngxfmt library.
//!
//! This example demonstrates how to marshal and unmarshal nginx access log
//! lines: against the built-in combined format, against custom templates,
//! and into both typed records and keyed entries.

use std::collections::HashMap;

use ngxfmt::{ngx_record, Access, Entry, Template};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== ngxfmt Basic Usage Example ===\n");

    combined_example()?;
    custom_record_example()?;
    json_mapping_example()?;
    error_handling_example()?;

    Ok(())
}

/// Example 1: the built-in combined format with the `Access` record
fn combined_example() -> Result<(), Box<dyn std::error::Error>> {
    println!("1. Combined Format");
    println!("------------------");

    let line = r#"127.0.0.1 - - [08/Nov/2013:13:39:18 +0000] "GET /api/users/123 HTTP/1.1" 200 612 "-" "curl/7.64.1""#;
    println!("Log line: {line}");

    let mut access = Access::default();
    ngxfmt::unmarshal_from_string(line, &mut access)?;

    println!("Client:  {}", access.remote_addr);
    println!("Request: {}", access.request);
    println!("Status:  {}", access.status);

    // and the record renders straight back into the same line
    assert_eq!(ngxfmt::marshal_to_string(&access)?, line);
    println!();
    Ok(())
}

/// Example 2: a custom format bound to a custom record
fn custom_record_example() -> Result<(), Box<dyn std::error::Error>> {
    println!("2. Custom Record");
    println!("----------------");

    ngx_record! {
        #[derive(Debug, Default)]
        struct Upstream {
            host: String => "upstream_host",
            status: i64 => "upstream_status",
            bytes: u64 => "bytes_received",
        }
    }

    let template = Template::new("$upstream_host -> $upstream_status ($bytes_received bytes)")?;

    let mut upstream = Upstream::default();
    template.unmarshal(b"10.1.4.22:8080 -> 502 (0 bytes)", &mut upstream)?;
    println!("Parsed: {upstream:?}");

    println!();
    Ok(())
}

/// Example 3: JSON-escaped templates decoded into keyed targets
fn json_mapping_example() -> Result<(), Box<dyn std::error::Error>> {
    println!("3. JSON Escaping and Mappings");
    println!("-----------------------------");

    let template = Template::new(r#"escape=json;{"user":"$user","note":"$note"}"#)?;

    let mut fields: HashMap<String, String> = HashMap::new();
    template.unmarshal(br#"{"user":"rene","note":"said \"hi\""}"#, &mut fields)?;
    println!("user = {}", fields["user"]);
    println!("note = {}", fields["note"]);

    // Entry offers typed accessors over the same decoding
    let access_template =
        Template::new(r#"$remote_addr "$request" $status $body_bytes_sent"#)?;
    let mut entry = Entry::new();
    access_template.unmarshal(br#"192.168.0.5 "POST /login HTTP/1.1" 401 199"#, &mut entry)?;
    println!(
        "{} sent {} bytes (status {})",
        entry.field("remote_addr")?,
        entry.int64_field("body_bytes_sent")?,
        entry.int_field("status")?
    );

    println!();
    Ok(())
}

/// Example 4: what failures look like
fn error_handling_example() -> Result<(), Box<dyn std::error::Error>> {
    println!("4. Error Handling");
    println!("-----------------");

    // compile-time: a variable may not start with a dot
    match Template::new("$host $.bad") {
        Ok(_) => unreachable!(),
        Err(err) => println!("compile error: {err}"),
    }

    // decode-time: the line does not match the template's literals
    let template = Template::new("status=$status")?;
    let mut entry = Entry::new();
    match template.unmarshal(b"code=200", &mut entry) {
        Ok(_) => unreachable!(),
        Err(err) => println!("decode error:  {err}"),
    }

    println!();
    Ok(())
}
