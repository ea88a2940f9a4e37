//! Input/output endpoints and encoder flags for one transcode.

use std::time::Duration;

use crate::probe::MediaDescriptor;
use crate::{Error, Result};

/// Muxer flag forced on pipe outputs, which cannot be seeked back to finalize
/// a header.
pub const FRAGMENTED_MOVFLAGS: &str = "frag_keyframe";

/// Where the encoder reads from or writes to.
#[derive(Debug, Default)]
pub enum Endpoint<P> {
    /// Not configured yet.
    #[default]
    Unset,
    /// A file path or URL passed to the encoder as an argument.
    Path(String),
    /// A stream connected to the encoder's stdin/stdout.
    Pipe(P),
}

impl<P> Endpoint<P> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self, Self::Pipe(_))
    }

    /// The configured path, if this endpoint is a path.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// The encoder argument naming this endpoint.
    fn arg<'a>(&'a self, pipe: &'a str) -> Option<&'a str> {
        match self {
            Self::Unset => None,
            Self::Path(p) => Some(p),
            Self::Pipe(_) => Some(pipe),
        }
    }

    fn take_pipe(self) -> Option<P> {
        match self {
            Self::Pipe(p) => Some(p),
            _ => None,
        }
    }
}

/// Endpoints, flag overrides and probed structure for one transcode.
///
/// `I` and `O` are the session-side pipe handles for input and output.
#[derive(Debug)]
pub struct MediaFile<I, O> {
    input: Endpoint<I>,
    output: Endpoint<O>,
    output_format: Option<String>,
    movflags: Option<String>,
    input_flags: Vec<String>,
    output_flags: Vec<String>,
    descriptor: MediaDescriptor,
}

impl<I, O> Default for MediaFile<I, O> {
    fn default() -> Self {
        Self {
            input: Endpoint::Unset,
            output: Endpoint::Unset,
            output_format: None,
            movflags: None,
            input_flags: Vec::new(),
            output_flags: Vec::new(),
            descriptor: MediaDescriptor::default(),
        }
    }
}

impl<I, O> MediaFile<I, O> {
    /// An empty media file: no endpoints, empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &Endpoint<I> {
        &self.input
    }

    pub fn output(&self) -> &Endpoint<O> {
        &self.output
    }

    pub fn descriptor(&self) -> &MediaDescriptor {
        &self.descriptor
    }

    pub fn set_descriptor(&mut self, descriptor: MediaDescriptor) {
        self.descriptor = descriptor;
    }

    /// Total input duration; zero when unknown.
    pub fn duration(&self) -> Duration {
        self.descriptor.duration()
    }

    pub fn output_format(&self) -> Option<&str> {
        self.output_format.as_deref()
    }

    pub fn movflags(&self) -> Option<&str> {
        self.movflags.as_deref()
    }

    /// Use `path` as the input.
    ///
    /// # Errors
    ///
    /// [`Error::EndpointConflict`] if an input pipe is configured.
    pub fn set_input_path(&mut self, path: impl Into<String>) -> Result<()> {
        if self.input.is_pipe() {
            return Err(Error::endpoint_conflict(
                "cannot set an input path when an input pipe has been created",
            ));
        }
        self.input = Endpoint::Path(path.into());
        Ok(())
    }

    /// Use `path` as the output.
    ///
    /// # Errors
    ///
    /// [`Error::EndpointConflict`] if an output pipe is configured.
    pub fn set_output_path(&mut self, path: impl Into<String>) -> Result<()> {
        if self.output.is_pipe() {
            return Err(Error::endpoint_conflict(
                "cannot set an output path when an output pipe has been created",
            ));
        }
        self.output = Endpoint::Path(path.into());
        Ok(())
    }

    /// Fail unless an input pipe could be attached now.
    pub fn check_input_pipe(&self) -> Result<()> {
        match &self.input {
            Endpoint::Unset => Ok(()),
            Endpoint::Path(_) => Err(Error::endpoint_conflict(
                "cannot create an input pipe when an input path exists",
            )),
            Endpoint::Pipe(_) => Err(Error::endpoint_conflict(
                "an input pipe has already been created",
            )),
        }
    }

    /// Fail unless an output pipe could be attached now.
    pub fn check_output_pipe(&self) -> Result<()> {
        match &self.output {
            Endpoint::Unset => Ok(()),
            Endpoint::Path(_) => Err(Error::endpoint_conflict(
                "cannot create an output pipe when an output path exists",
            )),
            Endpoint::Pipe(_) => Err(Error::endpoint_conflict(
                "an output pipe has already been created",
            )),
        }
    }

    /// Read the input from `pipe`.
    pub fn attach_input_pipe(&mut self, pipe: I) -> Result<()> {
        self.check_input_pipe()?;
        self.input = Endpoint::Pipe(pipe);
        Ok(())
    }

    /// Write the output to `pipe` in `container_format`.
    ///
    /// Also forces [`FRAGMENTED_MOVFLAGS`].
    pub fn attach_output_pipe(&mut self, pipe: O, container_format: impl Into<String>) -> Result<()> {
        self.check_output_pipe()?;
        self.output_format = Some(container_format.into());
        self.movflags = Some(FRAGMENTED_MOVFLAGS.to_string());
        self.output = Endpoint::Pipe(pipe);
        Ok(())
    }

    /// Force the output container format (`-f`).
    pub fn set_output_format(&mut self, format: impl Into<String>) {
        self.output_format = Some(format.into());
    }

    /// Override the muxer flags (`-movflags`).
    pub fn set_movflags(&mut self, flags: impl Into<String>) {
        self.movflags = Some(flags.into());
    }

    /// Flags placed before `-i`, passed through untouched.
    pub fn add_input_flags(&mut self, flags: impl IntoIterator<Item = impl Into<String>>) {
        self.input_flags.extend(flags.into_iter().map(Into::into));
    }

    /// Flags placed after the input, passed through untouched.
    pub fn add_output_flags(&mut self, flags: impl IntoIterator<Item = impl Into<String>>) {
        self.output_flags.extend(flags.into_iter().map(Into::into));
    }

    /// Serialize into encoder arguments:
    /// `[input flags] -i <in> [output flags] [-f fmt] [-movflags flags] <out>`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if either endpoint is unset.
    pub fn to_args(&self) -> Result<Vec<String>> {
        let input = self
            .input
            .arg("pipe:0")
            .ok_or_else(|| Error::configuration("input missing: set an input path or create an input pipe"))?;
        let output = self
            .output
            .arg("pipe:1")
            .ok_or_else(|| Error::configuration("output missing: set an output path or create an output pipe"))?;

        let mut args = self.input_flags.clone();
        args.push("-i".to_string());
        args.push(input.to_string());
        args.extend(self.output_flags.iter().cloned());
        if let Some(format) = &self.output_format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        if let Some(flags) = &self.movflags {
            args.push("-movflags".to_string());
            args.push(flags.clone());
        }
        args.push(output.to_string());
        Ok(args)
    }

    /// Split off the pipe handles, keeping the descriptor.
    pub(crate) fn into_pipes(self) -> (Option<I>, Option<O>, MediaDescriptor) {
        (
            self.input.take_pipe(),
            self.output.take_pipe(),
            self.descriptor,
        )
    }
}
