use clap::{Arg, Command};
use glulx_tools::asm;
use std::fs;
use std::io::{self, Read, Write};

fn main() -> Result<(), asm::Error> {
    env_logger::init();

    let matches = Command::new("Glulx assembler")
        .version("0.1.0")
        .about("Assemble the textual form into a Glulx story-file image")
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("IMAGE")
                .help("Write the image here instead of standard output"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Source file (defaults to standard input)")
                .index(1),
        )
        .get_matches();

    let source = match matches.get_one::<String>("INPUT") {
        Some(path) => {
            log::info!("Reading '{}'", path);
            fs::read_to_string(path)?
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let image = asm::assemble(&source)?;
    log::info!("Assembled {} bytes", image.len());

    match matches.get_one::<String>("output") {
        Some(path) => fs::write(path, &image)?,
        None => io::stdout().write_all(&image)?,
    }
    Ok(())
}
