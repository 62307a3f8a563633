/// On-demand process statistics, read straight from the OS. Any failure
/// yields zeroed values: a record whose child vanished between the
/// registry read and the sample must not turn `list` into an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sample {
    pub cpu_pct: f64,
    pub rss_bytes: u64,
}

/// Liveness probe via `kill(pid, 0)`. EPERM means the process exists
/// but belongs to someone else, so it counts as alive. Zombies are
/// dead for supervision purposes: they sit in the process table until
/// reaped and would otherwise read as a healthy child forever.
pub fn pid_alive(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }

    let result = unsafe { libc::kill(pid as i32, 0) };
    if result != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return errno == libc::EPERM;
    }

    #[cfg(target_os = "linux")]
    if linux::is_zombie(pid) {
        return false;
    }

    true
}

pub fn sample(pid: i64) -> Sample {
    if pid <= 0 {
        return Sample::default();
    }

    #[cfg(target_os = "linux")]
    {
        linux::sample(pid)
    }

    #[cfg(not(target_os = "linux"))]
    {
        Sample::default()
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::Sample;
    use std::fs;

    pub(super) struct StatFields {
        pub state: char,
        pub utime_ticks: u64,
        pub stime_ticks: u64,
        pub starttime_ticks: u64,
    }

    /// Parse a `/proc/<pid>/stat` line. The comm field may contain
    /// spaces and parentheses, so everything is indexed from the last
    /// closing paren: state is the first token after it, utime/stime
    /// are fields 14/15 and starttime is field 22 of the full line.
    pub(super) fn parse_stat(content: &str) -> Option<StatFields> {
        let after_comm = &content[content.rfind(')')? + 1..];
        let fields: Vec<&str> = after_comm.split_whitespace().collect();

        Some(StatFields {
            state: fields.first()?.chars().next()?,
            utime_ticks: fields.get(11)?.parse().ok()?,
            stime_ticks: fields.get(12)?.parse().ok()?,
            starttime_ticks: fields.get(19)?.parse().ok()?,
        })
    }

    fn read_stat(pid: i64) -> Option<StatFields> {
        let content = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        parse_stat(&content)
    }

    pub(super) fn is_zombie(pid: i64) -> bool {
        matches!(read_stat(pid), Some(fields) if fields.state == 'Z')
    }

    fn rss_bytes(pid: i64) -> Option<u64> {
        let content = fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
        let resident_pages: u64 = content.split_whitespace().nth(1)?.parse().ok()?;
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return None;
        }
        Some(resident_pages * page_size as u64)
    }

    fn system_uptime_secs() -> Option<f64> {
        let content = fs::read_to_string("/proc/uptime").ok()?;
        content.split_whitespace().next()?.parse().ok()
    }

    /// CPU percentage cumulative since process start: total cpu seconds
    /// over wall-clock seconds alive.
    fn cpu_pct(fields: &StatFields) -> Option<f64> {
        let clk_tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if clk_tck <= 0 {
            return None;
        }
        let clk_tck = clk_tck as f64;

        let cpu_secs = (fields.utime_ticks + fields.stime_ticks) as f64 / clk_tck;
        let elapsed = system_uptime_secs()? - fields.starttime_ticks as f64 / clk_tck;
        if elapsed <= 0.0 {
            return Some(0.0);
        }

        Some((cpu_secs / elapsed) * 100.0)
    }

    pub(super) fn sample(pid: i64) -> Sample {
        let Some(fields) = read_stat(pid) else {
            return Sample::default();
        };

        Sample {
            cpu_pct: cpu_pct(&fields).unwrap_or(0.0),
            rss_bytes: rss_bytes(pid).unwrap_or(0),
        }
    }

}
