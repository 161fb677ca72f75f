use std::io::Read;

use serde_json::json;
use twin_core::USER_ID_HEADER;
use twin_core::health::RawHealthState;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn print_json(value: &serde_json::Value, to_stderr: bool) {
    let formatted =
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    if to_stderr {
        eprintln!("{formatted}");
    } else {
        println!("{formatted}");
    }
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    print_json(&err, true);
    std::process::exit(4);
}

/// Print a locally computed result as pretty JSON and return exit code 0.
pub fn print_output<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_value(value) {
        Ok(v) => {
            print_json(&v, false);
            0
        }
        Err(e) => exit_error(&format!("Failed to serialize output: {e}"), None),
    }
}

/// Raw health readings from `--data` (inline JSON), `--file` (path, `-` for stdin), or empty.
pub fn read_raw_state(data: Option<&str>, file: Option<&str>) -> RawHealthState {
    let text = match (data, file) {
        (Some(_), Some(_)) => exit_error("Use either --data or --file, not both", None),
        (Some(inline), None) => inline.to_string(),
        (None, Some("-")) => {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                exit_error(&format!("Failed to read stdin: {e}"), None);
            }
            buf
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .unwrap_or_else(|e| exit_error(&format!("Failed to read {path}: {e}"), None)),
        (None, None) => return RawHealthState::new(),
    };

    parse_raw_state(&text).unwrap_or_else(|message| {
        exit_error(
            &message,
            Some(r#"Pass a JSON object, e.g. --data '{"ldl": 142, "history": {"ldl": [160, 150]}}'"#),
        )
    })
}

pub fn parse_raw_state(text: &str) -> Result<RawHealthState, String> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {e}"))?;
    if !value.is_object() {
        return Err("Health data must be a JSON object".to_string());
    }
    Ok(RawHealthState::from_value(value))
}

/// Execute an API request as `user_id`, print the response, exit with a structured code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    user_id: Option<&str>,
    body: Option<serde_json::Value>,
) -> i32 {
    let url = match reqwest::Url::parse(&format!("{api_url}{path}")) {
        Ok(u) => u,
        Err(e) => {
            print_json(
                &json!({
                    "error": "cli_error",
                    "message": format!("Invalid URL: {api_url}{path}: {e}")
                }),
                true,
            );
            return 4;
        }
    };

    tracing::debug!(%method, %url, "api request");
    let mut req = client().request(method, url);
    if let Some(id) = user_id {
        req = req.header(USER_ID_HEADER, id);
    }
    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            print_json(
                &json!({
                    "error": "connection_error",
                    "message": format!("{e}"),
                    "docs_hint": "Is the API server running? Check TWIN_API_URL."
                }),
                true,
            );
            return 3;
        }
    };

    let exit_code = exit_code_for(resp.status().as_u16());
    let resp_body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    print_json(&resp_body, exit_code != 0);
    exit_code
}

fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}
