use chrono::{DateTime, Local};

fn build_date(format: &str) -> String {
    let build_timestamp: i64 = env!("ELDERCALL_BUILD_TIME").parse().unwrap_or(0);
    let build_datetime: DateTime<Local> = DateTime::from_timestamp(build_timestamp, 0)
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_else(Local::now);
    build_datetime.format(format).to_string()
}

pub fn get_version_info() -> &'static str {
    Box::leak(
        format!(
            "eldercall {}\n\
         Build Time: {}\n\
         Git Commit: {}",
            env!("CARGO_PKG_VERSION"),
            build_date("%Y-%m-%d %H:%M:%S %Z"),
            env!("ELDERCALL_GIT_COMMIT"),
        )
        .into_boxed_str(),
    )
}

pub fn get_short_version() -> &'static str {
    Box::leak(
        format!(
            "{}-{}",
            env!("CARGO_PKG_VERSION"),
            env!("ELDERCALL_GIT_COMMIT")
        )
        .into_boxed_str(),
    )
}

/// Value sent as `User-Agent` on outbound provider requests.
pub fn get_useragent() -> String {
    format!(
        "eldercall/{} (built {})",
        env!("CARGO_PKG_VERSION"),
        build_date("%Y-%m-%d")
    )
}
