use muzzle::check::*;
use muzzle::jvm::RenderDescriptor;

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn main() -> io::Result<()> {
    env_logger::init();

    let matches = Command::new("Muzzle checker")
        .version(crate_version!())
        .about("Check that library class directories have everything instrumentation advice uses")
        .arg(
            Arg::new("agent")
                .long("agent")
                .value_name("DIR")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the advice and helper class files"),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .value_name("NAME")
                .default_value("instrumentation")
                .help("Name of the instrumentation module (for `dd.integration.<name>.enabled`)"),
        )
        .arg(
            Arg::new("advice")
                .long("advice")
                .value_name("CLASS_NAME")
                .required(true)
                .action(ArgAction::Append)
                .help("Advice class (eg. `com.acme.agent.PaintAdvice`)"),
        )
        .arg(
            Arg::new("helper")
                .long("helper")
                .value_name("CLASS_NAME")
                .action(ArgAction::Append)
                .help("Helper class injected along with the advice"),
        )
        .arg(
            Arg::new("internal")
                .long("internal-prefix")
                .value_name("PREFIX")
                .action(ArgAction::Append)
                .help("Package prefix of the instrumentation's own classes (eg. `com.acme.agent.`)"),
        )
        .arg(
            Arg::new("table")
                .long("print-table")
                .action(ArgAction::SetTrue)
                .help("Print the reference table before checking"),
        )
        .arg(
            Arg::new("LIBRARY")
                .help("Directories of library class files to check against")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let mut settings = Settings::new();
    for prefix in matches.get_many::<String>("internal").into_iter().flatten() {
        settings = settings.with_internal_prefix(prefix);
    }

    let mut descriptor = ModuleDescriptor::new(
        matches
            .get_one::<String>("name")
            .map_or("instrumentation", String::as_str),
    );
    for advice in matches.get_many::<String>("advice").into_iter().flatten() {
        descriptor = descriptor.with_advice_class(parse_class_name(advice));
    }
    for helper in matches.get_many::<String>("helper").into_iter().flatten() {
        descriptor = descriptor.with_helper_class(parse_class_name(helper));
    }
    let module = InstrumentationModule::new(descriptor, &IntegrationConfig::new());
    if !module.is_enabled() {
        log::warn!("Instrumentation {} is disabled by configuration", module.name());
    }

    let agent = match matches.get_one::<PathBuf>("agent") {
        Some(agent) => agent.clone(),
        None => exit(2),
    };
    let gate = Gate::new(DirectorySource::new(agent), settings);

    let stdout = StandardStream::stdout(ColorChoice::Auto);
    if matches.get_flag("table") {
        match gate.reference_table(&module) {
            Ok(table) => print_table(&stdout, &table)?,
            Err(err) => {
                log::error!("{}", err);
                exit(2);
            }
        }
    }

    let mut count_fail = 0;
    for library in matches.get_many::<PathBuf>("LIBRARY").into_iter().flatten() {
        log::info!("Checking against '{}'", library.display());
        let context: Arc<dyn ClassLoadingContext> =
            Arc::new(ClassPath::new(DirectorySource::new(library)));

        let (color, summary, details) = match gate.mismatches(&module, &*context) {
            Ok(mismatches) if mismatches.is_empty() && module.is_enabled() => {
                (Color::Green, b"PASS".as_ref(), vec![])
            }
            Ok(mismatches) => {
                count_fail += 1;
                let details = mismatches.iter().map(ToString::to_string).collect();
                (Color::Red, b"FAIL".as_ref(), details)
            }
            Err(err) => {
                count_fail += 1;
                (Color::Yellow, b"ERROR".as_ref(), vec![err.to_string()])
            }
        };

        let mut s = stdout.lock();
        s.write_all(b" - ")?;
        s.set_color(ColorSpec::new().set_bold(true))?;
        s.write_all(library.to_string_lossy().as_bytes())?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b" [")?;
        s.set_color(ColorSpec::new().set_fg(Some(color)))?;
        s.write_all(summary)?;
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        s.write_all(b"]\n")?;
        s.reset()?;
        for detail in details {
            writeln!(s, "   -- {}", detail)?;
        }
    }

    exit(if count_fail > 0 { 1 } else { 0 })
}

fn parse_class_name(name: &str) -> muzzle::jvm::BinaryName {
    match class_name(name) {
        Ok(class_name) => class_name,
        Err(err) => {
            log::error!("Invalid class name '{}': {}", name, err);
            exit(2);
        }
    }
}

fn print_table(stdout: &StandardStream, table: &ReferenceTable) -> io::Result<()> {
    let mut s = stdout.lock();
    for reference in table.references() {
        s.set_color(ColorSpec::new().set_bold(true))?;
        write!(s, "{}", reference.class_name)?;
        s.reset()?;
        writeln!(s, " [{}]", reference.flags)?;
        if let Some(super_name) = &reference.super_name {
            writeln!(s, "    extends {}", super_name)?;
        }
        for interface in &reference.interfaces {
            writeln!(s, "    implements {}", interface)?;
        }
        for (name, field) in &reference.fields {
            writeln!(s, "    field {}:{} [{}]", name, field.descriptor.render(), field.flags)?;
        }
        for (key, method) in &reference.methods {
            let descriptor = Reference::method_descriptor(key, method);
            writeln!(s, "    method {}{} [{}]", key.name, descriptor.render(), method.flags)?;
        }
        s.set_color(ColorSpec::new().set_dimmed(true))?;
        for source in &reference.sources {
            writeln!(s, "    from {}", source)?;
        }
        s.reset()?;
    }
    Ok(())
}
