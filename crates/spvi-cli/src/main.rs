use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic};

use spvi_cache::IntrospectionCache;
use spvi_ir::{IntrospectionParams, ShaderModule, ShaderStage, SpecValue, SpecializationMap};
use spvi_pipeline::PipelineIntrospection;
use spvi_reflect::decode::{SpirvModule, stage_of};

/// spvi: SPIR-V shader introspection
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print everything one entry point declares
    Inspect {
        /// SPIR-V binary
        input: PathBuf,

        /// Entry point name
        #[arg(short, long, default_value = "main")]
        entry: String,

        /// Stage of the entry point (default: the stage of the entry point with that name)
        #[arg(short, long)]
        stage: Option<ShaderStage>,
    },
    /// Merge several stages and print the pipeline layout they need
    Layout {
        /// Stages as STAGE=FILE, e.g. vertex=shader.vert.spv
        #[arg(required = true, value_parser = parse_stage_file)]
        stages: Vec<(ShaderStage, PathBuf)>,

        /// Entry point name, shared by every stage
        #[arg(short, long, default_value = "main")]
        entry: String,

        /// Specialization constant override as ID=VALUE (VALUE: true, false, 3, 3u, -3, 1.5)
        #[arg(long = "spec", value_parser = parse_spec)]
        spec: Vec<(u32, SpecValue)>,
    },
}

fn parse_stage_file(s: &str) -> Result<(ShaderStage, PathBuf), String> {
    let (stage, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected STAGE=FILE, got '{s}'"))?;
    let stage = stage.parse::<ShaderStage>().map_err(|e| e.to_string())?;
    Ok((stage, PathBuf::from(path)))
}

fn parse_spec(s: &str) -> Result<(u32, SpecValue), String> {
    let (id, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{s}'"))?;
    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid specialization id '{id}': {e}"))?;
    let value = value.trim();
    let parsed = match value {
        "true" => Some(SpecValue::Bool(true)),
        "false" => Some(SpecValue::Bool(false)),
        _ if value.contains(['.', 'e', 'E']) => value.parse().ok().map(SpecValue::Float),
        _ if value.starts_with('-') => value.parse().ok().map(SpecValue::Int),
        _ => value
            .strip_suffix('u')
            .unwrap_or(value)
            .parse()
            .ok()
            .map(SpecValue::UInt),
    };
    parsed
        .map(|v| (id, v))
        .ok_or_else(|| format!("invalid specialization value '{value}'"))
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    match Cli::parse().command {
        Command::Inspect {
            input,
            entry,
            stage,
        } => inspect(&input, &entry, stage),
        Command::Layout {
            stages,
            entry,
            spec,
        } => layout(&stages, &entry, spec.into_iter().collect()),
    }
}

fn read_shader(path: &Path) -> miette::Result<ShaderModule> {
    let code = std::fs::read(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    Ok(ShaderModule::spirv(code))
}

fn inspect(input: &Path, entry: &str, stage: Option<ShaderStage>) -> miette::Result<()> {
    let shader = read_shader(input)?;
    let stage = match stage {
        Some(stage) => stage,
        None => {
            let module = SpirvModule::parse(shader.code())
                .map_err(|e| miette::miette!("{e}"))
                .wrap_err_with(|| format!("failed to decode {}", input.display()))?;
            module
                .entry_points()
                .iter()
                .filter(|ep| ep.name == entry)
                .find_map(|ep| stage_of(ep.model))
                .ok_or_else(|| miette::miette!("no entry point named '{entry}' in {}", input.display()))?
        }
    };
    let params = IntrospectionParams::new(shader, entry, stage);
    let result = spvi_reflect::introspect(&params)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err_with(|| format!("failed to introspect {}", input.display()))?;
    print!("{}", spvi_ir::dump_stage(&result));
    Ok(())
}

fn layout(
    stages: &[(ShaderStage, PathBuf)],
    entry: &str,
    specialization: SpecializationMap,
) -> miette::Result<()> {
    let cache = IntrospectionCache::new();
    let mut pipeline = PipelineIntrospection::new();
    let overrides = (!specialization.is_empty()).then_some(&specialization);
    for (stage, path) in stages {
        let params = IntrospectionParams::new(read_shader(path)?, entry, *stage);
        let result = cache
            .get_or_compute(&params)
            .map_err(|e| miette::miette!("{e}"))
            .wrap_err_with(|| format!("failed to introspect {}", path.display()))?;
        pipeline
            .merge(&result, overrides)
            .map_err(|e| miette::miette!("{e}"))
            .wrap_err_with(|| format!("cannot merge {stage} stage from {}", path.display()))?;
    }
    print!("{}", pipeline.pipeline_layout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_values() {
        assert_eq!(parse_spec("3=4"), Ok((3, SpecValue::UInt(4))));
        assert_eq!(parse_spec("3=4u"), Ok((3, SpecValue::UInt(4))));
        assert_eq!(parse_spec("0=-2"), Ok((0, SpecValue::Int(-2))));
        assert_eq!(parse_spec("1=1.5"), Ok((1, SpecValue::Float(1.5))));
        assert_eq!(parse_spec("7=true"), Ok((7, SpecValue::Bool(true))));
        assert!(parse_spec("7").is_err());
        assert!(parse_spec("x=1").is_err());
        assert!(parse_spec("1=abc").is_err());
    }

    #[test]
    fn stage_files() {
        assert_eq!(
            parse_stage_file("fragment=a.spv"),
            Ok((ShaderStage::Fragment, PathBuf::from("a.spv")))
        );
        assert_eq!(
            parse_stage_file("tess-eval=b.spv").map(|(s, _)| s),
            Ok(ShaderStage::TessellationEvaluation)
        );
        assert!(parse_stage_file("pixel=c.spv").is_err());
        assert!(parse_stage_file("c.spv").is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
