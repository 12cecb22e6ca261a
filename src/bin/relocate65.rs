//! Resolves a `.o65` executable's relocations against concrete addresses
//! and an imports table, emitting flat binary output.
//!
//! Usage:
//!   relocate65 [options] input.o65 output.bin [data-output.bin]
//!
//! Options:
//!   -t ADDR   .text load address
//!   -d ADDR   .data load address
//!   -b ADDR   .bss load address
//!   -z ADDR   zeropage load address
//!   -i FILE   imports list (one "name value" pair per line)
//!   -v        increase log verbosity; may be repeated
//!
//! Addresses accept C-style `0x`/octal/decimal literals. When a single
//! output file is given, `.text` and `.data` are concatenated into it; with
//! two, `.text` goes to the first and `.data` (with any appended `.bss`)
//! to the second.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::process;

use o65::num;
use o65::relocate::{self, RelocateOptions};

fn print_usage() {
    eprintln!("Usage: relocate65 [options] input.o65 output.bin [data-output.bin]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t ADDR   .text load address");
    eprintln!("  -d ADDR   .data load address");
    eprintln!("  -b ADDR   .bss load address");
    eprintln!("  -z ADDR   zeropage load address");
    eprintln!("  -i FILE   imports list");
    eprintln!("  -v        increase log verbosity; may be repeated");
}

fn parse_addr_flag(args: &[String], i: usize, flag: &str) -> Option<u32> {
    let value = args.get(i + 1)?;
    match num::parse_c_uint(value) {
        Ok(addr) => Some(addr),
        Err(err) => {
            eprintln!("relocate65: {flag} {value}: {err}");
            process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut options = RelocateOptions::default();
    let mut imports_path: Option<String> = None;
    let mut verbosity = 0usize;
    let mut positionals: Vec<String> = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-t" => {
                options.text_addr = parse_addr_flag(&args, i, "-t");
                i += 2;
            }
            "-d" => {
                options.data_addr = parse_addr_flag(&args, i, "-d");
                i += 2;
            }
            "-b" => {
                options.bss_addr = parse_addr_flag(&args, i, "-b");
                i += 2;
            }
            "-z" => {
                options.zp_addr = parse_addr_flag(&args, i, "-z");
                i += 2;
            }
            "-i" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("relocate65: -i requires an argument");
                    process::exit(1);
                };
                imports_path = Some(value.clone());
                i += 2;
            }
            "-v" => {
                verbosity += 1;
                i += 1;
            }
            "--help" => {
                print_usage();
                process::exit(0);
            }
            arg if arg.starts_with('-') && arg != "-" => {
                eprintln!("relocate65: unknown option {arg}");
                print_usage();
                process::exit(1);
            }
            arg => {
                positionals.push(arg.to_string());
                i += 1;
            }
        }
    }

    stderrlog::new().verbosity(verbosity).init().unwrap();

    if positionals.len() < 2 || positionals.len() > 3 {
        print_usage();
        process::exit(1);
    }
    let input_file = &positionals[0];
    let text_output = &positionals[1];
    let data_output = positionals.get(2);

    let imports = match &imports_path {
        Some(path) => {
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    eprintln!("relocate65: reading {path}: {err}");
                    process::exit(1);
                }
            };
            match relocate::parse_imports(&text) {
                Ok(imports) => imports,
                Err(err) => {
                    eprintln!("relocate65: {path}: {err}");
                    process::exit(1);
                }
            }
        }
        None => HashMap::new(),
    };

    let bytes = match fs::read(input_file) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("relocate65: reading {input_file}: {err}");
            process::exit(1);
        }
    };

    let mut offset = 0;
    let image = match o65::image::read_image(&bytes, &mut offset) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("relocate65: {input_file}: {err}");
            process::exit(1);
        }
    };

    let relocated = match relocate::relocate(&image, &options, &imports) {
        Ok(relocated) => relocated,
        Err(err) => {
            eprintln!("relocate65: {input_file}: {err}");
            process::exit(1);
        }
    };

    log::info!(
        "relocated .text to {:#x} ({} bytes), .data to {:#x} ({} bytes)",
        relocated.text_addr,
        relocated.text.len(),
        relocated.data_addr,
        relocated.data.len()
    );

    let write_result = match data_output {
        Some(data_output) => fs::write(text_output, &relocated.text).and_then(|_| fs::write(data_output, &relocated.data)),
        None => {
            let mut combined = relocated.text.clone();
            combined.extend_from_slice(&relocated.data);
            fs::write(text_output, &combined)
        }
    };

    if let Err(err) = write_result {
        eprintln!("relocate65: writing output: {err}");
        process::exit(1);
    }
}
