use clap::{Arg, Command};
use glulx_tools::{container, disasm};
use std::fs;
use std::io::{self, BufWriter, Read, Write};

fn main() -> Result<(), disasm::Error> {
    env_logger::init();

    let matches = Command::new("Glulx disassembler")
        .version("0.1.0")
        .about("Recover the textual form of a Glulx story-file image")
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("SOURCE")
                .help("Write the listing here instead of standard output"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Story-file image (defaults to standard input)")
                .index(1),
        )
        .get_matches();

    let data = match matches.get_one::<String>("INPUT") {
        Some(path) => {
            log::info!("Reading '{}'", path);
            fs::read(path)?
        }
        None => {
            let mut buffer = vec![];
            io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };

    let image = container::unwrap(&data)?;
    let disassembly = disasm::disassemble(image)?;

    match matches.get_one::<String>("output") {
        Some(path) => {
            let mut out = BufWriter::new(fs::File::create(path)?);
            disasm::write_listing(&disassembly, image, &mut out)?;
            out.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            disasm::write_listing(&disassembly, image, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}
