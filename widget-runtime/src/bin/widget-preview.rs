use std::env;
use std::fs;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use widget_runtime::{BundleHandle, FrameRecorder, HostEvent, SandboxConfig, WidgetHost};
use widget_spec::{merge_datasource_commit, parse_spec, parse_values_json, parse_widget_xml, with_defaults};

/// Stop once the sandbox has been quiet this long.
const IDLE_TIMEOUT: Duration = Duration::from_millis(750);

struct Args {
    bundle: String,
    spec: String,
    values: Option<String>,
    stylesheet: Option<String>,
    component: Option<String>,
}

fn usage() -> ! {
    eprintln!("Usage: widget-preview <bundle.lua> <widget.xml|spec.json|spec.yaml> [values.json]");
    eprintln!("                      [--stylesheet style.css] [--component Name]");
    eprintln!();
    eprintln!("Renders the widget once, applies any datasource commits it makes,");
    eprintln!("and prints the final frame as HTML. Log level via RUST_LOG.");
    process::exit(1);
}

fn parse_args() -> Args {
    let mut positional = Vec::new();
    let mut stylesheet = None;
    let mut component = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stylesheet" => stylesheet = Some(args.next().unwrap_or_else(|| usage())),
            "--component" => component = Some(args.next().unwrap_or_else(|| usage())),
            "-h" | "--help" => usage(),
            _ => positional.push(arg),
        }
    }
    if positional.len() < 2 || positional.len() > 3 {
        usage();
    }
    let mut positional = positional.into_iter();
    Args {
        bundle: positional.next().unwrap_or_default(),
        spec: positional.next().unwrap_or_default(),
        values: positional.next(),
        stylesheet,
        component,
    }
}

fn read(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("✗ cannot read {}: {}", path, e);
        process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = parse_args();
    let script = read(&args.bundle);
    let stylesheet = args.stylesheet.as_deref().map(read).unwrap_or_default();
    let spec_text = read(&args.spec);

    let (spec, component_name, component_id) = if spec_text.trim_start().starts_with('<') {
        match parse_widget_xml(&spec_text) {
            Ok(def) => {
                let name = def.component_name().to_string();
                (def.spec, name, def.id)
            }
            Err(e) => {
                eprintln!("✗ {}: {}", args.spec, e);
                process::exit(1);
            }
        }
    } else {
        match parse_spec(&spec_text) {
            Ok(spec) => (spec, String::new(), String::new()),
            Err(e) => {
                eprintln!("✗ {}: {}", args.spec, e);
                process::exit(1);
            }
        }
    };
    let component_name = args.component.unwrap_or(component_name);
    if component_name.is_empty() {
        eprintln!("✗ no component name: pass --component or use a widget XML definition");
        process::exit(1);
    }

    let mut values = match args.values.as_deref().map(read) {
        Some(text) => parse_values_json(&text).unwrap_or_else(|e| {
            eprintln!("✗ {}: {}", args.values.as_deref().unwrap_or_default(), e);
            process::exit(1);
        }),
        None => Default::default(),
    };
    values = with_defaults(&spec, &values);

    let config = SandboxConfig::from_env().unwrap_or_else(|e| {
        eprintln!("✗ {}", e);
        process::exit(1);
    });

    let recorder = FrameRecorder::new();
    let mut host = WidgetHost::new(config, Arc::new(recorder.clone()));
    let bundle = BundleHandle::new(script, stylesheet, component_name, component_id);
    if let Err(e) = host.load(bundle) {
        eprintln!("✗ {}", e);
        process::exit(1);
    }
    if let Err(e) = host.set_properties(spec.clone(), values.clone()) {
        eprintln!("✗ {}", e);
        process::exit(1);
    }

    let mut exit_code = 0;
    while let Ok(Some(event)) = tokio::time::timeout(IDLE_TIMEOUT, host.next_event()).await {
        match event {
            HostEvent::Ready { generation } => tracing::info!(%generation, "sandbox ready"),
            HostEvent::DatasourceCommit {
                datasource_key,
                items_json,
            } => {
                eprintln!("↺ {} committed: {}", datasource_key, items_json);
                values = merge_datasource_commit(&values, &datasource_key, &items_json);
                if let Err(e) = host.set_properties(spec.clone(), values.clone()) {
                    tracing::warn!(error = %e, "could not send merged values, stopping");
                    exit_code = 2;
                    break;
                }
            }
            HostEvent::Failed { kind, message } => {
                eprintln!("✗ {}: {}", kind.title(), message);
                exit_code = 2;
            }
        }
    }

    match recorder.last() {
        Some(frame) => println!("{}", frame.to_html()),
        None => {
            eprintln!("✗ the sandbox painted nothing");
            exit_code = 2;
        }
    }
    host.destroy();
    process::exit(exit_code);
}
