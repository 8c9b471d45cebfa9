use std::env;
use std::fs;
use std::process;
use widget_spec::{parse_spec, parse_widget_xml, SpecError};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: spec-validate <widget.xml|spec.json|spec.yaml>...");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  spec-validate Rating.xml");
        eprintln!("  spec-validate specs/*.json");
        process::exit(1);
    }

    let mut exit_code = 0;

    for file_path in &args[1..] {
        match validate_file(file_path) {
            Ok(summary) => println!("✓ {} is valid ({})", file_path, summary),
            Err(e) => {
                eprintln!("✗ {} has errors:", file_path);
                print_error(&e);
                exit_code = 1;
            }
        }
    }

    process::exit(exit_code);
}

fn validate_file(path: &str) -> Result<String, SpecError> {
    let content = fs::read_to_string(path)
        .map_err(|e| SpecError::ValidationError(format!("Failed to read file: {}", e)))?;

    if content.trim_start().starts_with("<") {
        let def = parse_widget_xml(&content)?;
        Ok(format!(
            "widget '{}', {} properties",
            def.component_name(),
            def.spec.flatten().len()
        ))
    } else {
        let spec = parse_spec(&content)?;
        Ok(format!("{} properties", spec.flatten().len()))
    }
}

fn print_error(error: &SpecError) {
    match error {
        SpecError::XmlError(msg) | SpecError::JsonError(msg) | SpecError::YamlError(msg) => {
            eprintln!("  Syntax error:");
            eprintln!("    {}", msg);
        }
        SpecError::ValidationError(msg) => {
            eprintln!("  Validation error:");
            eprintln!("    {}", msg);
        }
        SpecError::UnknownPropertyType { key, type_name } => {
            eprintln!("  Unknown type '{}' on property '{}'", type_name, key);
        }
        SpecError::DuplicateKey { key } => {
            eprintln!("  Duplicate property key '{}'", key);
            eprintln!("    Keys must be unique within their property list");
        }
        e => eprintln!("  {}", e),
    }
}
