use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use structopt::StructOpt;

#[derive(Clone, Debug, StructOpt)]
pub struct OutputOptions {
    #[structopt(long = "format", short = "f", parse(try_from_str), default_value = "json-summ", possible_values = &OUTPUT_FORMAT_STRINGS)]
    pub fmt: OutputFormat,
    #[structopt(long = "output", short = "o")]
    pub file: Option<PathBuf>,
    #[structopt(long)]
    pub log: Option<PathBuf>,
}

pub fn clap_range_validator<T>(
    minval: Option<T>,
    maxval: Option<T>,
) -> impl Fn(String) -> Result<(), String>
where
    T: FromStr + PartialOrd + Display + Copy,
    T::Err: Display,
{
    return move |val| {
        let x: T = val.parse().map_err(|e: T::Err| e.to_string())?;
        if let Some(y) = minval {
            if x < y {
                return Err(format!("must be at least {}", y));
            }
        }
        if let Some(y) = maxval {
            if x > y {
                return Err(format!("must be at most {}", y));
            }
        }
        return Ok(());
    };
}

pub const OUTPUT_FORMAT_STRINGS: [&str; 2] = ["json", "json-summ"];

#[derive(Debug, Copy, Clone)]
pub enum OutputFormat {
    Json,
    JsonSummary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return match s {
            "json" => Ok(Self::Json),
            "json-summ" => Ok(Self::JsonSummary),
            _ => Err(format!("invalid string: {}", s)),
        };
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::JsonSummary
    }
}

pub fn write_report(options: &OutputOptions, report: json::JsonValue) -> Result<()> {
    let render = |mut buf: Box<dyn Write>| -> Result<()> {
        match options.fmt {
            OutputFormat::Json => report.write_pretty(&mut buf, 2)?,
            OutputFormat::JsonSummary => {
                // summaries stay single-line so they compose in shell pipelines
                report.write(&mut buf)?;
                writeln!(buf)?;
            }
        }
        Ok(())
    };
    match options.file.as_ref() {
        Some(path) => render(Box::new(std::io::BufWriter::new(std::fs::File::create(path)?))),
        None => render(Box::new(std::io::stdout())),
    }
}
