use std::{
    env,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::exit,
};

use anyhow::{bail, Context as _, Result};
use hack_vm::{defines_sys_init, extract_vm_name, is_vm_file, parser, read_vm_file, Generator};

/// Collects file paths from the given path.
fn collect_file_path<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let path = path.as_ref();

    if path.is_dir() {
        for p in path.read_dir()?.filter_map(|p| p.map(|p| p.path()).ok()) {
            if is_vm_file(&p) {
                paths.push(p);
            }
        }
    } else if is_vm_file(path) {
        paths.push(path.to_path_buf());
    } else {
        bail!("Could not read {}", path.display());
    }

    Ok(paths)
}

/// `<file>.asm` for a single input file, `<dir>/<dirname>.asm` when
/// translating every `.vm` file under a directory.
fn output_path(input: &Path) -> Result<PathBuf> {
    if input.is_dir() {
        let dir_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("could not determine directory name of {}", input.display()))?;
        Ok(input.join(format!("{dir_name}.asm")))
    } else {
        Ok(input.with_extension("asm"))
    }
}

fn help() -> ! {
    println!(
        "\
vm file name or directory is not given.

Usage: cargo run -p hack-vm -- [--no-bootstrap] <vm filename or directory>
"
    );
    exit(0);
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let no_bootstrap = args.iter().any(|a| a == "--no-bootstrap");
    let Some(path) = args.iter().find(|a| a.as_str() != "--no-bootstrap") else {
        help();
    };
    let path = Path::new(path);

    let file_paths = collect_file_path(path).context("could not retrieve given vm files")?;

    let mut sources = Vec::new();
    for p in &file_paths {
        let name = extract_vm_name(p)?;
        let vm = read_vm_file(p).unwrap_or_else(|e| {
            eprintln!("Could not load vm files properly. {e}");
            exit(1);
        });

        sources.push((name, vm));
    }

    let mut instructions = Vec::new();
    for (name, program) in &sources {
        let (is, errors) = parser::parse(program)?;
        if !errors.is_empty() {
            eprintln!("Failed to parse given program file: {name}");
            eprintln!("{errors:?}");
            exit(1);
        }

        instructions.push((*name, is));
    }

    let emit_bootstrap = !no_bootstrap && defines_sys_init(&instructions);

    let out_path = output_path(path)?;
    let file = File::create(&out_path)
        .with_context(|| format!("could not create {}", out_path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut gen = Generator::new(&mut writer);

    gen.translate(instructions, emit_bootstrap)?;

    Ok(())
}
