//! Converts a statically-linked MOS 6502-family ELF executable into a
//! `.o65` relocatable image.
//!
//! Usage:
//!   elf2o65 [options] input.elf [output.o65]
//!
//! Options:
//!   -a NAME       record NAME as the image's author
//!   -b            force the bsszero mode bit
//!   -d            record the current time as the image's creation date
//!   -h            hosted mode: rewrite low-zeropage references to externals
//!   -l NAME       record NAME as the image's linker/program name
//!   -o HEXBYTES   attach HEXBYTES (whitespace-tolerant hex) as the OS option
//!   -s N          set the stack size (C-style 0x/0/decimal)
//!   -v            increase log verbosity; may be repeated

use std::env;
use std::fs;
use std::process;

use o65::convert::{self, ConvertOptions};
use o65::num;

fn print_usage() {
    eprintln!("Usage: elf2o65 [options] input.elf [output.o65]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -a NAME       record NAME as the image's author");
    eprintln!("  -b            force the bsszero mode bit");
    eprintln!("  -d            record the current time as the image's creation date");
    eprintln!("  -h            hosted mode: rewrite low-zeropage references to externals");
    eprintln!("  -l NAME       record NAME as the image's linker/program name");
    eprintln!("  -o HEXBYTES   attach HEXBYTES as the OS option");
    eprintln!("  -s N          set the stack size");
    eprintln!("  -v            increase log verbosity; may be repeated");
}

fn derive_output_path(input: &str) -> String {
    match input.strip_suffix(".elf") {
        Some(stem) => format!("{stem}.o65"),
        None => format!("{input}.o65"),
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut options = ConvertOptions::default();
    let mut verbosity = 0usize;
    let mut input_file: Option<String> = None;
    let mut output_file: Option<String> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-a" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("elf2o65: -a requires an argument");
                    process::exit(1);
                };
                options.author = Some(value.clone());
                i += 2;
            }
            "-b" => {
                options.force_bsszero = true;
                i += 1;
            }
            "-d" => {
                options.created = true;
                i += 1;
            }
            "-h" => {
                options.hosted = true;
                i += 1;
            }
            "-l" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("elf2o65: -l requires an argument");
                    process::exit(1);
                };
                options.linker = Some(value.clone());
                i += 2;
            }
            "-o" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("elf2o65: -o requires an argument");
                    process::exit(1);
                };
                match num::parse_hex_bytes(value) {
                    Ok(bytes) => options.os_info = Some(bytes),
                    Err(err) => {
                        eprintln!("elf2o65: {err}");
                        process::exit(1);
                    }
                }
                i += 2;
            }
            "-s" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("elf2o65: -s requires an argument");
                    process::exit(1);
                };
                match num::parse_c_uint(value) {
                    Ok(stack) => options.stack = stack,
                    Err(err) => {
                        eprintln!("elf2o65: {err}");
                        process::exit(1);
                    }
                }
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
                eprintln!("elf2o65: unknown option {arg}");
                print_usage();
                process::exit(1);
            }
            arg => {
                if input_file.is_none() {
                    input_file = Some(arg.to_string());
                } else if output_file.is_none() {
                    output_file = Some(arg.to_string());
                } else {
                    eprintln!("elf2o65: unexpected argument {arg}");
                    process::exit(1);
                }
                i += 1;
            }
        }
    }

    stderrlog::new().verbosity(verbosity).init().unwrap();

    let input_file = match input_file {
        Some(f) => f,
        None => {
            print_usage();
            process::exit(1);
        }
    };
    let output_file = output_file.unwrap_or_else(|| derive_output_path(&input_file));

    let elf_bytes = match fs::read(&input_file) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("elf2o65: reading {input_file}: {err}");
            process::exit(1);
        }
    };

    let image = match convert::convert(&elf_bytes, &options) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("elf2o65: {input_file}: {err}");
            process::exit(1);
        }
    };

    let mut image = image;
    let mut buf = Vec::new();
    if let Err(err) = o65::image::write_image(&mut buf, &mut image) {
        eprintln!("elf2o65: encoding {output_file}: {err}");
        process::exit(1);
    }

    if let Err(err) = fs::write(&output_file, &buf) {
        eprintln!("elf2o65: writing {output_file}: {err}");
        process::exit(1);
    }

    log::info!("wrote {output_file} ({} bytes)", buf.len());
}
