//! hbridge REPL
//!
//! Interactive driver for a bridge session backed by an in-memory host.
//! Commands are read from a file when one is given, otherwise from a prompt.
//!
//! ```text
//! call alert("hi")     outbound call, issued from a worker thread
//! invoke echo(1, 2)    host-to-engine call of a registered method
//! get $version         read a registry property
//! set answer = 42      write a registry property
//! del answer           remove a registry property
//! ls                   list properties, then methods
//! quit                 shut the session down and exit
//! ```

use std::error::Error;
use std::sync::Arc;
use std::thread;

use hostbridge::runtime::CallResult;
use hostbridge::{
    BridgeConfig, CallBridge, HostAdapter, Identifier, MemoryHost, NativeVariant, RawVariant, ScriptGateway,
    ScriptObject, Variant,
};
use parking_lot::Mutex;
use regex::Regex;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

const HELP: &str = "\
commands:
  call NAME(ARGS)     call a host function from a worker thread
  invoke NAME(ARGS)   invoke a registered method as the host would
  get NAME            read a property
  set NAME = VALUE    write a property
  del NAME            remove a property
  ls                  list identifiers
  quit                shut down and exit
values: undefined, null, true, false, integers, decimals, \"strings\"";

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1) {
        Some(filename) => run_file(filename),
        None => run_repl(),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_file(filename: &str) -> Result<(), Box<dyn Error>> {
    let source = std::fs::read_to_string(filename).map_err(|e| format!("reading {}: {}", filename, e))?;
    let mut session = Session::new()?;
    for line in source.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !session.execute(line) {
            break;
        }
    }
    session.shutdown();
    Ok(())
}

fn run_repl() -> Result<(), Box<dyn Error>> {
    println!("hbridge {}", env!("CARGO_PKG_VERSION"));
    println!("Type `help` for commands, Ctrl+D to exit.\n");

    let mut session = Session::new()?;
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if !session.execute(line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    session.shutdown();
    Ok(())
}

/// Parsed REPL command
#[derive(Debug, PartialEq)]
enum Command {
    Call { name: String, args: Vec<Variant> },
    Invoke { name: String, args: Vec<Variant> },
    Get(String),
    Set(String, Variant),
    Del(String),
    List,
    Help,
    Quit,
}

struct Parser {
    call: Regex,
    get: Regex,
    set: Regex,
    del: Regex,
    arg: Regex,
}

impl Parser {
    fn new() -> Result<Self, regex::Error> {
        Ok(Parser {
            call: Regex::new(r"^(call|invoke)\s+([^\s(]+)\s*\((.*)\)$")?,
            get: Regex::new(r"^get\s+(\S+)$")?,
            set: Regex::new(r"^set\s+([^\s=]+)\s*=?\s*(.+)$")?,
            del: Regex::new(r"^del\s+(\S+)$")?,
            arg: Regex::new(r#""(?:[^"\\]|\\.)*"|[^,\s][^,]*"#)?,
        })
    }

    fn parse(&self, line: &str) -> Result<Command, String> {
        match line {
            "ls" => return Ok(Command::List),
            "help" => return Ok(Command::Help),
            "quit" | "exit" => return Ok(Command::Quit),
            _ => {}
        }
        if let Some(caps) = self.call.captures(line) {
            let name = caps[2].to_string();
            let args = self.parse_args(&caps[3]);
            return Ok(if &caps[1] == "call" {
                Command::Call { name, args }
            } else {
                Command::Invoke { name, args }
            });
        }
        if let Some(caps) = self.get.captures(line) {
            return Ok(Command::Get(caps[1].to_string()));
        }
        if let Some(caps) = self.set.captures(line) {
            return Ok(Command::Set(caps[1].to_string(), parse_value(&caps[2])));
        }
        if let Some(caps) = self.del.captures(line) {
            return Ok(Command::Del(caps[1].to_string()));
        }
        Err(format!("unrecognized command: {}", line))
    }

    fn parse_args(&self, text: &str) -> Vec<Variant> {
        self.arg
            .find_iter(text)
            .map(|m| parse_value(m.as_str()))
            .collect()
    }
}

/// Literal syntax: keywords, numbers, quoted strings; anything else is a bare string
fn parse_value(text: &str) -> Variant {
    let text = text.trim();
    match text {
        "undefined" => return Variant::Void,
        "null" => return Variant::Null,
        "true" => return Variant::Boolean(true),
        "false" => return Variant::Boolean(false),
        _ => {}
    }
    if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Variant::String(inner.replace("\\\"", "\"").replace("\\\\", "\\"));
    }
    if let Ok(i) = text.parse::<i32>() {
        return Variant::Int32(i);
    }
    if let Ok(d) = text.parse::<f64>() {
        return Variant::Double(d);
    }
    Variant::String(text.to_string())
}

/// A gateway over a demo host
///
/// The gateway lives on the host's designated thread: every command that
/// touches it or the marshaller is shipped there with `run_on_host`.
struct Session {
    host: Arc<MemoryHost>,
    gateway: Arc<Mutex<ScriptGateway>>,
    bridge: Arc<CallBridge>,
    parser: Parser,
}

impl Session {
    fn new() -> Result<Self, Box<dyn Error>> {
        let config = BridgeConfig::from_env()?;
        let host = MemoryHost::try_new(Some(("hbridge", "hbridge")))?;
        define_host_functions(&host);

        let gateway = host
            .enter(move |host| {
                let mut gateway = ScriptGateway::new(host.clone(), config);
                define_engine_methods(gateway.object_mut());
                gateway
            })
            .ok_or("host thread exited during setup")?;
        let bridge = gateway.bridge();

        Ok(Session {
            host,
            gateway: Arc::new(Mutex::new(gateway)),
            bridge,
            parser: Parser::new()?,
        })
    }

    /// Run `f` against the gateway on the host thread
    fn on_host<F>(&self, f: F) -> String
    where
        F: FnOnce(&Arc<MemoryHost>, &mut ScriptGateway) -> String + Send + 'static,
    {
        let gateway = Arc::clone(&self.gateway);
        self.host
            .enter(move |host| f(host, &mut gateway.lock()))
            .unwrap_or_else(|| "host thread is gone".to_string())
    }

    /// Run one command; false once the session should end
    fn execute(&mut self, line: &str) -> bool {
        let command = match self.parser.parse(line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                return true;
            }
        };

        let output = match command {
            Command::Call { name, args } => self.call(name, args),
            Command::Invoke { name, args } => self.on_host(move |host, gateway| invoke(host, gateway, &name, &args)),
            Command::Get(name) => self.on_host(move |_, gateway| {
                match gateway.object().get_property(&Identifier::new(&name)) {
                    Some(value) => value.to_string(),
                    None => format!("{} is not defined", name),
                }
            }),
            Command::Set(name, value) => self.on_host(move |_, gateway| {
                if gateway.object_mut().set_property(name.as_str(), value) {
                    String::new()
                } else {
                    "session is shutting down".to_string()
                }
            }),
            Command::Del(name) => self.on_host(move |host, gateway| {
                let id = host.string_identifier(&name);
                gateway.remove_property(id).to_string()
            }),
            Command::List => self.on_host(|_, gateway| {
                let names: Vec<String> = gateway.object().enumerate().iter().map(|id| id.to_string()).collect();
                names.join(" ")
            }),
            Command::Help => HELP.to_string(),
            Command::Quit => return false,
        };
        if !output.is_empty() {
            println!("{}", output);
        }
        true
    }

    /// Outbound call, issued from a worker thread like an engine would
    fn call(&self, name: String, args: Vec<Variant>) -> String {
        let bridge = Arc::clone(&self.bridge);
        let id = Identifier::new(&name);
        let worker = thread::spawn(move || bridge.call_external(&id, &args));
        match worker.join() {
            Ok(Some(value)) => value.to_string(),
            Ok(None) => format!("call to {} failed", name),
            Err(_) => "worker thread panicked".to_string(),
        }
    }

    fn shutdown(&self) {
        self.on_host(|_, gateway| {
            gateway.destroy();
            String::new()
        });
        log::debug!("session closed, {} host object(s) alive", self.host.live_objects());
    }
}

/// Invoke a method through the gateway, in host form
fn invoke(host: &Arc<MemoryHost>, gateway: &ScriptGateway, name: &str, args: &[Variant]) -> String {
    let host: Arc<dyn HostAdapter> = host.clone();
    let marshaller = gateway.object().bridge().marshaller();
    let native_args: Vec<NativeVariant> = args.iter().map(|arg| marshaller.variant_to_native(arg)).collect();
    let raw_args: Vec<RawVariant> = native_args.iter().map(NativeVariant::as_raw).collect();

    let id = host.string_identifier(name);
    let (handled, result) = gateway.invoke(id, &raw_args);
    match result {
        Some(raw) => {
            let value = marshaller.variant_from_native(&NativeVariant::adopt(&host, raw));
            format!("{} (handled: {})", value, handled)
        }
        None => format!("no result (handled: {})", handled),
    }
}

/// Functions the engine can reach with `call`
fn define_host_functions(host: &Arc<MemoryHost>) {
    let alert = host.create_function(|args| {
        let text: Vec<String> = args.iter().map(|arg| format!("{:?}", arg)).collect();
        println!("[host] alert: {}", text.join(", "));
        Some(RawVariant::Void)
    });
    let add = host.create_function(|args| {
        let sum = args.iter().fold(0.0, |sum, arg| match arg {
            RawVariant::Int32(i) => sum + f64::from(*i),
            RawVariant::Double(d) => sum + d,
            _ => sum,
        });
        Some(RawVariant::Double(sum))
    });
    let now = host.create_function(|_| Some(RawVariant::String(format!("{:?}", std::time::SystemTime::now()))));
    let settings = host.create_object();
    host.put(settings, "theme", RawVariant::String("dark".to_string()));

    host.define_global("alert", RawVariant::Object(alert));
    host.define_global("add", RawVariant::Object(add));
    host.define_expression("clock.now", RawVariant::Object(now));
    host.define_expression("settings", RawVariant::Object(settings));
    for handle in [alert, add, now, settings] {
        host.release(handle);
    }
}

/// Methods the host can reach with `invoke`
fn define_engine_methods(object: &mut ScriptObject) {
    object.set_method("echo", |_: &ScriptObject, _: &Identifier, args: &[Variant]| {
        CallResult::new(true, args.first().cloned())
    });
    object.set_method("count", |_: &ScriptObject, _: &Identifier, args: &[Variant]| {
        CallResult::handled(args.len() as i32)
    });
    // Calls back out to the host from inside a host-initiated call
    object.set_method("relay", |o: &ScriptObject, _: &Identifier, args: &[Variant]| {
        let Some((target, rest)) = args.split_first() else {
            return CallResult::unhandled();
        };
        let result = o.call_external(&Identifier::new(target.as_str()), rest);
        CallResult::new(result.is_some(), result)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_value("undefined"), Variant::Void);
        assert_eq!(parse_value(" 42 "), Variant::Int32(42));
        assert_eq!(parse_value("2.5"), Variant::Double(2.5));
        assert_eq!(parse_value(r#""a \"b\"""#), Variant::from("a \"b\""));
        assert_eq!(parse_value("bare"), Variant::from("bare"));
    }

    #[test]
    fn test_parse_commands() {
        let parser = Parser::new().unwrap();
        assert_eq!(
            parser.parse(r#"call alert("x, y", 3)"#).unwrap(),
            Command::Call {
                name: "alert".to_string(),
                args: vec![Variant::from("x, y"), Variant::Int32(3)],
            }
        );
        assert_eq!(
            parser.parse("invoke count()").unwrap(),
            Command::Invoke {
                name: "count".to_string(),
                args: vec![],
            }
        );
        assert_eq!(parser.parse("set answer = 42").unwrap(), Command::Set("answer".to_string(), Variant::Int32(42)));
        assert_eq!(parser.parse("get $version").unwrap(), Command::Get("$version".to_string()));
        assert_eq!(parser.parse("ls").unwrap(), Command::List);
        assert!(parser.parse("frobnicate").is_err());
    }

    #[test]
    fn test_commands_run_on_host_thread() {
        let mut session = Session::new().unwrap();
        assert!(session.execute("set answer = 42"));
        assert_eq!(
            session.on_host(|host, gateway| {
                let id = host.string_identifier("answer");
                format!("{:?}", gateway.get_property(id))
            }),
            "Some(Int32(42))"
        );
        let listed = session.on_host(|_, gateway| {
            gateway.object().enumerate().iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" ")
        });
        assert!(listed.contains("answer"));
        assert_eq!(
            session.on_host(|host, gateway| invoke(host, gateway, "count", &[Variant::Null, Variant::Null])),
            "2 (handled: true)"
        );
        assert_eq!(session.call("add".to_string(), vec![Variant::from(1), Variant::from(2)]), "3");
        session.shutdown();
    }
}
