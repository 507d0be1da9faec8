use rand::Rng;

/// Display label `<carrier><8 digits>`, e.g. `WZ04718263`.
///
/// Not checked against existing numbers; the ticket id is the key.
pub fn ticket_number(carrier_code: &str, fallback: &str) -> String {
    let prefix = carrier_prefix(carrier_code)
        .or_else(|| carrier_prefix(fallback))
        .unwrap_or_else(|| "XX".to_string());
    let suffix: u32 = rand::thread_rng().gen_range(0..100_000_000);
    format!("{}{:08}", prefix, suffix)
}

fn carrier_prefix(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}
