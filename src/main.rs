use std::io::{BufRead, Lines, StdinLock};
use std::path::PathBuf;

use structopt::StructOpt;
use tmgen::vm::{load_listing, Console, Machine, MachineConfig};

use tracing_subscriber::fmt;

fn main() {
    if let Err(ref e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), anyhow::Error> {
    let opt = Opt::from_args();

    if let Some((_, filter)) = std::env::vars().find(|x| x.0 == "TM_TRACE") {
        let subscriber = fmt::Subscriber::builder()
            .with_ansi(true)
            .pretty()
            .with_env_filter(filter)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        // the machine logs through `log`
        tracing_log::LogTracer::init()?;
    }

    let text = std::fs::read_to_string(&opt.file)?;
    let listing = load_listing(&text)?;
    if opt.print {
        print!("{}", listing);
    }

    let mut machine = Machine::new(MachineConfig {
        instruction_memory: opt.instruction_memory,
        data_memory: opt.data_memory,
        step_limit: opt.max_steps,
    });
    machine.load(&listing)?;
    let stdin = std::io::stdin();
    let mut console = StdConsole {
        given: opt.input.into_iter(),
        stdin: stdin.lock().lines(),
    };
    let steps = machine.run(&mut console)?;
    log::info!("{} halted after {} steps", opt.file.display(), steps);
    Ok(())
}

/// Takes input from the command line first, then one integer per line from stdin
struct StdConsole<'a> {
    given: std::vec::IntoIter<i32>,
    stdin: Lines<StdinLock<'a>>,
}

impl Console for StdConsole<'_> {
    fn read(&mut self) -> Option<i32> {
        if let Some(value) = self.given.next() {
            return Some(value);
        }
        loop {
            let line = self.stdin.next()?.ok()?;
            match line.trim().parse() {
                Ok(value) => return Some(value),
                Err(_) if line.trim().is_empty() => continue,
                Err(e) => {
                    eprintln!("not an integer: {:?} ({})", line.trim(), e);
                    return None;
                }
            }
        }
    }

    fn write(&mut self, value: i32) {
        println!("{}", value);
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "tm", about = "Runs a TM listing")]
struct Opt {
    /// The listing to run
    #[structopt(parse(from_os_str))]
    file: PathBuf,
    /// Values for `IN`, used before anything is read from stdin
    #[structopt(short = "i", long = "input", allow_hyphen_values = true)]
    input: Vec<i32>,
    /// Stop with an error after this many instructions
    #[structopt(long = "max-steps")]
    max_steps: Option<u64>,
    /// Print the loaded listing before running it
    #[structopt(long = "print")]
    print: bool,
    #[structopt(long = "instruction-memory", default_value = "1024")]
    instruction_memory: usize,
    #[structopt(long = "data-memory", default_value = "1024")]
    data_memory: usize,
}
