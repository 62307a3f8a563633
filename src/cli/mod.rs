pub mod logs;

use colored::Colorize;
use global_placeholders::global;
use macros_rs::{crashln, string, ternary};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gopm2::config::{self, AppSpec};
use gopm2::helpers::{self, ColoredString};
use gopm2::process::{ProcessItem, Status};
use gopm2::socket::{self, SocketRequest, SocketResponse};

use tabled::{
    settings::{
        object::{Rows, Segment},
        style::BorderColor,
        themes::Colorization,
        Color, Modify, Style,
    },
    Table, Tabled,
};

/// Options collected from `start` flags for a single-script launch.
pub struct StartOpts {
    pub name: Option<String>,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<String>,
    pub instances: usize,
    pub exec_mode: String,
    pub watch: bool,
    pub ignore: Vec<String>,
    pub log_file: Option<PathBuf>,
    pub error_log_file: Option<PathBuf>,
    pub max_restarts: u64,
    pub min_uptime: Option<String>,
}

fn request(request: &SocketRequest) -> SocketResponse {
    let socket_path = PathBuf::from(global!("gopm2.socket"));
    match socket::send_request(&socket_path, request) {
        Ok(response) => response,
        Err(err) => crashln!("{} ERROR: {err}", *helpers::FAIL),
    }
}

fn expect_success(response: SocketResponse) {
    match response {
        SocketResponse::Success(message) => {
            println!("{} SUCCESS: {message}", *helpers::SUCCESS)
        }
        SocketResponse::Error(message) => crashln!("{} ERROR: {message}", *helpers::FAIL),
        other => crashln!("{} ERROR: unexpected response: {other:?}", *helpers::FAIL),
    }
}

fn parse_env_pairs(pairs: &[String]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) => {
                env.insert(key.to_string(), value.to_string());
            }
            None => crashln!(
                "{} ERROR: invalid env entry '{pair}', expected KEY=VALUE",
                *helpers::FAIL
            ),
        }
    }
    env
}

/// `start <script|config>`: config files fan out into one START per
/// app; a bare script becomes a single spec named after its file stem.
pub fn start(script: &str, opts: StartOpts) {
    if config::is_config_path(script) {
        let document = match config::load(Path::new(script)) {
            Ok(document) => document,
            Err(err) => crashln!("{} ERROR: {err}", *helpers::FAIL),
        };

        let mut failed = false;
        for app in document.apps {
            let name = app.name.clone();
            match request(&SocketRequest::Start(app)) {
                SocketResponse::Success(message) => {
                    println!("{} SUCCESS: {message}", *helpers::SUCCESS)
                }
                SocketResponse::Error(message) => {
                    eprintln!("{} ERROR: failed to start '{name}': {message}", *helpers::FAIL);
                    failed = true;
                }
                other => crashln!("{} ERROR: unexpected response: {other:?}", *helpers::FAIL),
            }
        }
        if failed {
            std::process::exit(1);
        }
        return;
    }

    let name = opts.name.clone().unwrap_or_else(|| {
        Path::new(script)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| string!(script))
    });

    let cwd = opts
        .cwd
        .clone()
        .or_else(|| std::env::current_dir().ok());

    let spec = AppSpec {
        name,
        script: string!(script),
        args: opts.args,
        cwd,
        env: parse_env_pairs(&opts.env),
        instances: opts.instances,
        exec_mode: opts.exec_mode,
        watch: opts.watch,
        watch_ignore: opts.ignore,
        log_file: opts.log_file,
        error_log_file: opts.error_log_file,
        max_restarts: opts.max_restarts,
        min_uptime: opts.min_uptime,
    };

    expect_success(request(&SocketRequest::Start(spec)));
}

pub fn stop(target: &str) {
    expect_success(request(&SocketRequest::Stop(string!(target))));
}

pub fn restart(target: &str) {
    expect_success(request(&SocketRequest::Restart(string!(target))));
}

pub fn delete(target: &str) {
    expect_success(request(&SocketRequest::Delete(string!(target))));
}

pub fn save() {
    expect_success(request(&SocketRequest::Save));
}

pub fn resurrect() {
    expect_success(request(&SocketRequest::Resurrect));
}

pub fn flush(target: Option<&str>) {
    expect_success(request(&SocketRequest::Flush(target.map(String::from))));
}

pub fn watch_enable(target: &str) {
    expect_success(request(&SocketRequest::WatchEnable(string!(target))));
}

pub fn watch_disable(target: &str) {
    expect_success(request(&SocketRequest::WatchDisable(string!(target))));
}

fn fetch_list() -> Vec<ProcessItem> {
    match request(&SocketRequest::List) {
        SocketResponse::List(items) => items,
        SocketResponse::Error(message) => crashln!("{} ERROR: {message}", *helpers::FAIL),
        other => crashln!("{} ERROR: unexpected response: {other:?}", *helpers::FAIL),
    }
}

fn status_cell(status: Status) -> ColoredString {
    ColoredString(match status {
        Status::Online => string!(status).green().bold(),
        Status::Stopped => string!(status).red().bold(),
        Status::Stopping => string!(status).yellow().bold(),
        Status::Errored => string!(status).red().bold(),
    })
}

fn render_list(items: &[ProcessItem]) {
    #[derive(Tabled)]
    struct Row {
        id: usize,
        name: String,
        pid: String,
        status: ColoredString,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Mem")]
        mem: String,
        uptime: String,
        restarts: u64,
        watch: String,
    }

    let rows: Vec<Row> = items
        .iter()
        .map(|item| Row {
            id: item.id,
            name: item.name.clone(),
            pid: ternary!(item.pid > 0, item.pid.to_string(), string!("n/a")),
            status: status_cell(item.status),
            cpu: format!("{:.1}%", item.cpu_pct),
            mem: helpers::format_memory(item.rss_bytes),
            uptime: ternary!(
                item.status == Status::Online,
                helpers::format_uptime(item.uptime_secs),
                string!("0s")
            ),
            restarts: item.restarts,
            watch: ternary!(item.watch, string!("on"), string!("off")),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded().remove_verticals())
        .with(Modify::new(Segment::all()).with(BorderColor::filled(Color::FG_BRIGHT_BLACK)))
        .with(Colorization::exact([Color::FG_BRIGHT_CYAN], Rows::first()))
        .to_string();
    println!("{table}");
}

pub fn list(format: &str) {
    let items = fetch_list();

    match format {
        "json" => match serde_json::to_string(&items) {
            Ok(encoded) => println!("{encoded}"),
            Err(err) => crashln!("{} ERROR: {err}", *helpers::FAIL),
        },
        "raw" => println!("{items:?}"),
        _ => {
            if items.is_empty() {
                println!("{} No processes", *helpers::INFO);
            } else {
                render_list(&items);
            }
        }
    }
}

pub fn describe(target: &str, format: &str) {
    let detail = match request(&SocketRequest::Describe(string!(target))) {
        SocketResponse::Detail(detail) => detail,
        SocketResponse::Error(message) => crashln!("{} ERROR: {message}", *helpers::FAIL),
        other => crashln!("{} ERROR: unexpected response: {other:?}", *helpers::FAIL),
    };

    if format == "json" {
        match serde_json::to_string_pretty(&*detail) {
            Ok(encoded) => println!("{encoded}"),
            Err(err) => crashln!("{} ERROR: {err}", *helpers::FAIL),
        }
        return;
    }

    println!("{}", "Process details".bright_white().bold());
    let field = |label: &str, value: String| println!("  {}: {value}", label.cyan());
    field("id", detail.id.to_string());
    field("name", detail.name.clone());
    field("script", detail.script.clone());
    field("args", format!("{:?}", detail.args));
    field("cwd", detail.cwd.display().to_string());
    field("status", status_cell(detail.status).to_string());
    field("pid", detail.pid.to_string());
    field("cpu", format!("{:.1}%", detail.cpu_pct));
    field("memory", helpers::format_memory(detail.rss_bytes));
    field("uptime", helpers::format_uptime(detail.uptime_secs));
    field("restarts", detail.restarts.to_string());
    field("max restarts", detail.max_restarts.to_string());
    field("min uptime", detail.min_uptime.clone());
    field("start time", match detail.start_time {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => string!("never"),
    });
    field("exec mode", detail.exec_mode.to_string());
    field("watch", detail.watch.to_string());
    if !detail.watch_ignore.is_empty() {
        field("watch ignore", format!("{:?}", detail.watch_ignore));
    }
    field("log file", detail.log_file.display().to_string());
    field("error log", detail.error_log_file.display().to_string());
    if !detail.env.is_empty() {
        println!("  {}:", "env".cyan());
        for (key, value) in &detail.env {
            println!("    {key}={value}");
        }
    }
}

/// Clear-screen list refresh every 5 seconds.
pub fn monit() {
    println!("{} Monitoring (press Ctrl+C to exit)", *helpers::INFO);
    loop {
        print!("\x1b[H\x1b[2J");
        println!(
            "Updated: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let items = fetch_list();
        if items.is_empty() {
            println!("{} No processes", *helpers::INFO);
        } else {
            render_list(&items);
        }
        std::thread::sleep(Duration::from_secs(5));
    }
}

pub fn config_generate(file: Option<&str>) {
    let path = file.unwrap_or("ecosystem.config.json");
    match config::generate_template(Path::new(path)) {
        Ok(()) => println!("{} SUCCESS: generated config template: {path}", *helpers::SUCCESS),
        Err(err) => crashln!("{} ERROR: {err}", *helpers::FAIL),
    }
}

pub fn config_export(file: Option<&str>) {
    let path = file.unwrap_or("ecosystem.config.json");
    let specs = match request(&SocketRequest::Export) {
        SocketResponse::Specs(specs) => specs,
        SocketResponse::Error(message) => crashln!("{} ERROR: {message}", *helpers::FAIL),
        other => crashln!("{} ERROR: unexpected response: {other:?}", *helpers::FAIL),
    };

    let document = config::Config { apps: specs };
    match config::save(&document, Path::new(path)) {
        Ok(()) => println!("{} SUCCESS: exported config to {path}", *helpers::SUCCESS),
        Err(err) => crashln!("{} ERROR: {err}", *helpers::FAIL),
    }
}

/// Generate an OS startup script that resurrects the daemon at boot.
pub fn startup() {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => crashln!("{} ERROR: failed to locate gopm2 binary: {err}", *helpers::FAIL),
    };

    if cfg!(target_os = "linux") {
        startup_systemd(&exe);
    } else if cfg!(target_os = "macos") {
        startup_launchd(&exe);
    } else {
        crashln!("{} ERROR: unsupported platform for startup scripts", *helpers::FAIL);
    }
}

fn startup_systemd(exe: &Path) {
    let is_root = unsafe { libc::geteuid() == 0 };
    let exe = exe.display();
    let base = global!("gopm2.base");

    let (service_dir, target) = if is_root {
        (PathBuf::from("/etc/systemd/system"), "multi-user.target")
    } else {
        let home = match home::home_dir() {
            Some(home) => home,
            None => crashln!("{} ERROR: unable to determine home directory", *helpers::FAIL),
        };
        (home.join(".config/systemd/user"), "default.target")
    };

    let service = format!(
        r#"[Unit]
Description=GOPM2 Process Manager Daemon
After=network.target

[Service]
Type=simple
WorkingDirectory={base}
ExecStart={exe} daemon
Restart=on-failure
RestartSec=5s

[Install]
WantedBy={target}
"#
    );

    if let Err(err) = std::fs::create_dir_all(&service_dir) {
        crashln!("{} ERROR: failed to create {}: {err}", *helpers::FAIL, service_dir.display());
    }
    let service_path = service_dir.join("gopm2.service");
    if let Err(err) = std::fs::write(&service_path, service) {
        crashln!("{} ERROR: failed to write {}: {err}", *helpers::FAIL, service_path.display());
    }

    println!(
        "{} SUCCESS: service file created at {}",
        *helpers::SUCCESS,
        service_path.display()
    );
    if is_root {
        println!("  systemctl daemon-reload");
        println!("  systemctl enable --now gopm2.service");
    } else {
        println!("  systemctl --user daemon-reload");
        println!("  systemctl --user enable --now gopm2.service");
        println!("  loginctl enable-linger $USER");
    }
}

fn startup_launchd(exe: &Path) {
    let home = match home::home_dir() {
        Some(home) => home,
        None => crashln!("{} ERROR: unable to determine home directory", *helpers::FAIL),
    };

    let plist = json!({
        "Label": "com.gopm2.daemon",
        "ProgramArguments": [exe.display().to_string(), "daemon"],
        "RunAtLoad": true,
        "KeepAlive": true,
    });
    let plist_path = home.join("Library/LaunchAgents/com.gopm2.daemon.plist");

    println!("{} Run the following to install the launch agent:", *helpers::SUCCESS);
    println!("  mkdir -p {}", plist_path.parent().unwrap().display());
    println!("  cat > {} <<'EOF'", plist_path.display());
    println!("{}", serde_json::to_string_pretty(&plist).unwrap_or_default());
    println!("EOF");
    println!("  plutil -convert xml1 {}", plist_path.display());
    println!("  launchctl load {}", plist_path.display());
}
