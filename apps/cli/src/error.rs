use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Failed to load settings"))]
    LoadSettings { source: tailtray_core::Error },

    #[snafu(display("Supervisor task failed"))]
    Supervisor { source: tokio::task::JoinError },
}
