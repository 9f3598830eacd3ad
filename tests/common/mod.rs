use csfloat_client::{Client, Config};

pub const KEY: &str = "test-key";

pub fn client_for(base_url: &str) -> Client {
    csfloat_client::logging::init_logging(Some("warn"));
    let cfg = Config {
        api_url: base_url.to_string(),
        safety_margin_secs: 0,
        ..Config::new(KEY)
    };
    Client::new(&cfg).expect("client")
}

pub fn reset_in(secs: i64) -> String {
    (chrono::Utc::now().timestamp() + secs).to_string()
}
