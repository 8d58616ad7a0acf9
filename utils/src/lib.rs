/// Formats a byte count with binary units: `512 B`, `1.5 KiB`, `3.0 GiB`.
///
/// Used for the per-container summary and per-blob progress log lines.
pub fn human_bytes(size: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    if size < 1024 {
        return format!("{} B", size);
    }
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
