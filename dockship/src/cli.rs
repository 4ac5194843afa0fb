mod build;
mod render;

use clap::{Parser, Subcommand};

use crate::{image_name, Result};

#[derive(Debug, Parser)]
#[command(version = crate::version::VERSION, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Clone a repository, build the image from its Dockerfile and push it to a registry
    #[command(arg_required_else_help = true)]
    Build(build::BuildArgs),

    /// Check whether an image name is acceptable without building anything
    #[command(arg_required_else_help = true)]
    Validate { image_name: String },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Build(args) => {
                build::build(args)?;
            }
            Commands::Validate { image_name } => {
                image_name::validate(&image_name)?;
                println!("{image_name:?} is a valid image name");
            }
        }

        Ok(())
    }
}
