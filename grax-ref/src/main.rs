use anyhow::Result;
use clap::Arg;
use clap::Command;
use grax::compile::Precompile;
use grax::ir::ElementType;
use grax::ir::Program;
use grax::ir::Shape;
use grax::ops::builtin::Add;
use grax::ops::builtin::Allocate;
use grax::ops::builtin::Mul;
use grax::shared::Shared;
use grax::shared::SharedExt;
use grax::TransformOptions;
use grax_ref::RefModel;
use std::sync::Arc;
use tracing::Level;

fn cli() -> Command {
    Command::new("grax-ref")
        .about("Runs the reference pipeline over a sample dataflow graph")
        .args(grax::default_arguments())
        .arg(
            Arg::new("streams")
                .long("streams")
                .help("Number of concurrent streams of the reference device")
                .value_parser(clap::value_parser!(usize))
                .default_value("2"),
        )
}

/// A small graph with two scratch buffers and two pointwise operations, so
/// every pass in the pipeline has something to do.
fn sample_program() -> Result<Shared<Program>> {
    let program = Shared::new(Program::new().into());
    let main = program.rd().main();
    let mut module = main.wr();
    let shape = Shape::new(ElementType::Float32, vec![8]);
    let x = module.add_parameter("x", shape.clone());
    let y = module.add_parameter("y", shape.clone());
    let buf0 = module.add_instruction(
        Allocate {
            shape: shape.clone(),
        },
        vec![],
    )?;
    let sum = module.add_instruction(
        Precompile { op: Box::new(Add) },
        vec![x, y.clone(), buf0],
    )?;
    let buf1 = module.add_instruction(Allocate { shape }, vec![])?;
    let product = module.add_instruction(
        Precompile { op: Box::new(Mul) },
        vec![sum, y, buf1],
    )?;
    module.add_return(vec![product])?;
    drop(module);
    Ok(program)
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let options = TransformOptions::from_matches(&matches);
    let level = if options.trace_passes {
        Level::INFO
    } else {
        Level::WARN
    };
    if let Err(e) = grax::init_subscriber(level) {
        eprintln!("Failed to initialize logging: {e}");
    }
    let streams = *matches.get_one::<usize>("streams").unwrap();

    let program = sample_program()?;
    let model = Arc::new(RefModel::new(streams));
    let passes = grax_ref::passes(model, &options);
    grax::run_passes(&program, &passes, &options)?;
    print!("{}", program.rd());
    Ok(())
}
