//! Stdout and stderr rendering

use serde_json::Value;

pub fn print_success(payload: &Value) {
    match serde_json::to_string_pretty(payload) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{payload}"),
    }
}

pub fn print_error(envelope: &Value) {
    eprintln!("{envelope}");
}
