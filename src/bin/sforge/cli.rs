use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, ValueEnum};

use shift_forge::Representation;
use shift_forge::predict::BackendKind;

#[derive(Parser)]
#[command(
    name = "sforge",
    about = "NMR-spectrum and fingerprint features for SMILES tables, scored by model ensembles",
    version,
    author,
    before_help = crate::display::banner_for_help()
)]
pub struct Cli {
    /// Input CSV with MOLECULE_NAME and SMILES columns
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Feature representation to generate
    #[arg(
        short,
        long,
        value_name = "TYPE",
        default_value = "1h",
        ignore_case = true
    )]
    pub representation: RepresentationArg,

    /// Keep intermediate directories and files after the run
    #[arg(long, visible_alias = "debug")]
    pub keep_intermediates: bool,

    /// Show the model registry with training metrics after the results
    #[arg(long)]
    pub models: bool,

    #[command(flatten)]
    pub backends: BackendOptions,

    #[command(flatten)]
    pub paths: PathOptions,

    /// Suppress progress output (results and warnings are still printed)
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log detail (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Model backend selection. With none given, every backend is enabled.
#[derive(Args)]
#[command(next_help_heading = "Model Backends")]
pub struct BackendOptions {
    /// Enable support vector regression models
    #[arg(long, visible_alias = "use_svr")]
    pub use_svr: bool,

    /// Enable gradient-boosted tree models
    #[arg(long, visible_alias = "use_xgb")]
    pub use_xgb: bool,

    /// Enable dense neural network models
    #[arg(long, visible_alias = "use_dnn")]
    pub use_dnn: bool,

    /// Enable convolutional neural network models
    #[arg(long, visible_alias = "use_cnn")]
    pub use_cnn: bool,
}

impl BackendOptions {
    /// The explicitly requested backends; empty when no flag was given.
    pub fn selected(&self) -> Vec<BackendKind> {
        [
            (self.use_svr, BackendKind::Svr),
            (self.use_xgb, BackendKind::Xgb),
            (self.use_dnn, BackendKind::Dnn),
            (self.use_cnn, BackendKind::Cnn),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }
}

/// Configuration file and directory overrides.
#[derive(Args)]
#[command(next_help_heading = "Configuration")]
pub struct PathOptions {
    /// Pipeline configuration (TOML file)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for intermediate files and embedding logs
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Directory receiving the <TAG>_results folders
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Directory holding <TAG>_models_info.csv and model artifacts
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RepresentationArg {
    /// ¹H NMR shift histogram
    #[value(name = "1h")]
    Proton,
    /// ¹³C NMR shift histogram
    #[value(name = "13c")]
    Carbon,
    /// Hashed path fingerprint
    Fp,
    /// ¹H and ¹³C histograms side by side
    Hybrid,
}

impl From<RepresentationArg> for Representation {
    fn from(arg: RepresentationArg) -> Self {
        match arg {
            RepresentationArg::Proton => Representation::Proton,
            RepresentationArg::Carbon => Representation::Carbon,
            RepresentationArg::Fp => Representation::Fingerprint,
            RepresentationArg::Hybrid => Representation::Hybrid,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_to_proton_with_all_backends() {
        let cli = Cli::try_parse_from(["sforge", "in.csv"]).unwrap();
        assert!(matches!(cli.representation, RepresentationArg::Proton));
        assert!(cli.backends.selected().is_empty());
        assert!(!cli.keep_intermediates);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parses_representation_case_insensitively() {
        let cli = Cli::try_parse_from(["sforge", "in.csv", "-r", "13C"]).unwrap();
        assert_eq!(Representation::from(cli.representation), Representation::Carbon);
        let cli = Cli::try_parse_from(["sforge", "in.csv", "--representation", "FP"]).unwrap();
        assert_eq!(Representation::from(cli.representation), Representation::Fingerprint);
    }

    #[test]
    fn collects_backend_flags() {
        let cli = Cli::try_parse_from(["sforge", "in.csv", "--use-svr", "--use_cnn", "-vv"]).unwrap();
        assert_eq!(cli.backends.selected(), vec![BackendKind::Svr, BackendKind::Cnn]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn requires_an_input() {
        assert!(Cli::try_parse_from(["sforge", "--models"]).is_err());
    }
}
