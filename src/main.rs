/// axiom-core-demo — a small CLI that exercises the numeric tower, struct
/// system, chaperone layer, and hash tables directly, without a reader or
/// evaluator. There is no script-running subcommand here: the surface
/// syntax, macro expander, and compiler all live outside this crate.

use axiom_core::chaperone;
use axiom_core::conf::AxConf;
use axiom_core::errors::{CoreError, Diagnostic};
use axiom_core::hash::{Comparator, HashTable};
use axiom_core::numeric;
use axiom_core::struct_instance::{construct, ConstructOutcome, FieldAccessor};
use axiom_core::struct_type::{make_struct_type_unguarded, StructTypeParams};
use axiom_core::value::Value;
use clap::{Parser as ClapParser, Subcommand};
use miette::Result;
use std::sync::Arc;

#[derive(ClapParser)]
#[command(
    name = "axiom-core-demo",
    version = "0.1.0",
    about = "Exercises the Axiom core value layer",
    long_about = "axiom-core-demo — numeric tower, struct system, chaperones, and hash tables, driven directly (no reader/evaluator)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add two fixnums, promoting through the numeric tower as needed.
    Add { a: i64, b: i64 },
    /// Round a flonum to an exact result (round-half-away-from-zero).
    Round { x: f64 },
    /// Build a two-field struct type, construct an instance, and read it back.
    Struct,
    /// Wrap a fresh vector with a no-op impersonator and read through it.
    Chaperone,
    /// Populate an `equal`-keyed hash table and look a key back up.
    Hash,
    /// Print the current configuration.
    Conf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).map_err(|e| {
        let d = Diagnostic::from_error(&e);
        miette::miette!("{}", d)
    })
}

fn run(cli: Cli) -> Result<(), CoreError> {
    match cli.command {
        Commands::Add { a, b } => {
            let sum = numeric::add(&Value::Fixnum(a), &Value::Fixnum(b))?;
            println!("{} + {} = {:?}", a, b, sum);
        }

        Commands::Round { x } => {
            let rounded = numeric::round(&Value::Flonum(x))?;
            println!("(round {}) = {:?} ({})", x, rounded, rounded.type_name());
        }

        Commands::Struct => {
            let ty = make_struct_type_unguarded(StructTypeParams::new("point", 2))?;
            let inst = match construct(&ty, vec![Value::Fixnum(3), Value::Fixnum(4)])? {
                ConstructOutcome::Done(inst) => inst,
                ConstructOutcome::NeedsGuard { .. } => unreachable!("point has no guard"),
            };
            let x = FieldAccessor { declared_type: Arc::clone(&ty), field_index: 0, name: Some("point-x".to_string()) };
            let y = FieldAccessor { declared_type: ty, field_index: 1, name: Some("point-y".to_string()) };
            let inst_val = Value::Struct(inst);
            println!("point = {:?}, x = {:?}, y = {:?}", inst_val, x.call(&inst_val)?, y.call(&inst_val)?);
        }

        Commands::Chaperone => {
            let vec_val = Value::vector(vec![Value::Fixnum(1), Value::Fixnum(2), Value::Fixnum(3)]);
            let identity = Value::Procedure(axiom_core::value::ProcedureValue::named("identity-handler"));
            let wrapped = chaperone::make_vector_wrapper(vec_val.clone(), vec![identity.clone(), identity], true)?;
            println!("impersonator? {}  chaperone-of original? {}", chaperone::is_impersonator(&wrapped), chaperone::chaperone_of(&wrapped, &vec_val));
        }

        Commands::Hash => {
            let keys = vec![Value::vector(vec![Value::Fixnum(1)])];
            let vals = vec![Value::Symbol(0)];
            let table = HashTable::from_pairs(Comparator::Equal, true, keys, vals);
            let lookup_key = Value::vector(vec![Value::Fixnum(1)]);
            let found = table.get(&lookup_key);
            println!("equal-hash lookup on a fresh but structurally-equal key: {:?}", found);
        }

        Commands::Conf => {
            let conf = AxConf::load();
            for key in conf.list() {
                println!("{}", key);
            }
        }
    }

    Ok(())
}
