use std::{
    env, fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use somlj::{CompileOptions, Compiler, Severity};

const USAGE: &str = "usage: somlj [options] som_file [extra_args]
options:
  -cp        paths to som files, separated by ':'
             the path of som_file is added automatically and the
             core library is integrated in the executable
  -lua       also generate Lua source code
  -json      also dump each class module as JSON
  -dump-ast  also write a textual AST dump per class
  -nojit     switch off the JIT of the target VM
  -trace     enable the VM tracing hook
  -h         display this information";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut som_file: Option<PathBuf> = None;
    let mut extra_args = Vec::new();
    let mut options = CompileOptions::new();
    let mut emit_json = false;
    let mut dump_ast = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            "-lua" => options.emit_lua = true,
            "-json" => emit_json = true,
            "-dump-ast" => dump_ast = true,
            "-nojit" => options.use_jit = false,
            "-trace" => options.trace = true,
            "-cp" => {
                let Some(paths) = args.get(i + 1) else {
                    eprintln!("error: invalid -cp option");
                    return ExitCode::FAILURE;
                };
                options.class_paths.extend(paths.split(':').map(PathBuf::from));
                i += 1;
            }
            arg if !arg.starts_with('-') => {
                if som_file.is_none() {
                    som_file = Some(PathBuf::from(arg));
                } else {
                    extra_args.push(arg.to_owned());
                }
            }
            arg => {
                eprintln!("error: invalid command line option {arg}");
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let Some(som_file) = som_file else {
        eprintln!("error: expecting a SOM file with a run method; use -h for help");
        return ExitCode::FAILURE;
    };
    options.program_args = extra_args;

    let compiler = Compiler::new(options);
    let compilation = match compiler.compile(&som_file) {
        Ok(c) => c,
        Err(failure) => {
            eprint!("{}", failure.render());
            return ExitCode::FAILURE;
        }
    };
    for d in compilation.diags.iter() {
        if d.severity == Severity::Warning {
            eprintln!("warning: {}", d.render(&compilation.model));
        }
    }

    let out_dir = som_file.parent().unwrap_or(Path::new(".")).to_path_buf();
    let mut generated: Vec<PathBuf> = Vec::new();

    for module in &compilation.modules {
        if let Some(path) = write_artifact(&out_dir, "Bc", &module.class_name, "bcl", &module.disassemble()) {
            generated.push(path);
        }
        if emit_json
            && let Some(path) =
                write_artifact(&out_dir, "Json", &module.class_name, "json", &module.to_json())
        {
            generated.push(path);
        }
        if dump_ast {
            let text = somlj::dump::dump_class(&compilation.model, module.class);
            if let Some(path) = write_artifact(&out_dir, "Ast", &module.class_name, "txt", &text) {
                generated.push(path);
            }
        }
    }
    for (cid, source) in &compilation.lua_sources {
        let name = compilation.model.class_name(*cid).to_owned();
        if let Some(path) = write_artifact(&out_dir, "Lua", &name, "lua", source) {
            generated.push(path);
        }
    }

    println!(
        "compiled {} classes, main class {}",
        compilation.loading_order.len(),
        compilation.model.class_name(compilation.main_class)
    );
    for path in &generated {
        println!("generated {}", path.display());
    }
    ExitCode::SUCCESS
}

fn write_artifact(out_dir: &Path, sub: &str, name: &str, ext: &str, text: &str) -> Option<PathBuf> {
    let dir = out_dir.join(sub);
    if fs::create_dir_all(&dir).is_err() {
        eprintln!("error: cannot create directory {}", dir.display());
        return None;
    }
    let path = dir.join(format!("{name}.{ext}"));
    match fs::write(&path, text) {
        Ok(()) => Some(path),
        Err(err) => {
            eprintln!("error: cannot write {}: {err}", path.display());
            None
        }
    }
}
