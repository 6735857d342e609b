pub mod background;
pub mod optimization;
pub mod types;

use crate::{
    error::ProcessingError,
    file::WorkingFile,
    schema::{ConvertParams, OptimizeParams, Operation, ResizeParams, Step},
};

pub use background::{BackgroundRemovalClient, Clock, PollState, PredictionApi, ReplicateApi, SystemClock};
pub use optimization::OptimizationApiClient;

pub trait ProcessingClient: Send + Sync {
    fn optimize(
        &self,
        file: &WorkingFile,
        params: &OptimizeParams,
    ) -> Result<WorkingFile, ProcessingError> {
        let _ = (file, params);
        Err(unsupported(Operation::Optimize))
    }

    fn resize(&self, file: &WorkingFile, params: &ResizeParams) -> Result<WorkingFile, ProcessingError> {
        let _ = (file, params);
        Err(unsupported(Operation::Resize))
    }

    fn convert(
        &self,
        file: &WorkingFile,
        params: &ConvertParams,
    ) -> Result<WorkingFile, ProcessingError> {
        let _ = (file, params);
        Err(unsupported(Operation::Convert))
    }

    fn remove_background(&self, file: &WorkingFile) -> Result<WorkingFile, ProcessingError> {
        let _ = file;
        Err(unsupported(Operation::RemoveBackground))
    }
}

fn unsupported(op: Operation) -> ProcessingError {
    ProcessingError::failed(format!("{op} is not supported by this client"))
}

pub fn apply(
    client: &dyn ProcessingClient,
    step: &Step,
    file: &WorkingFile,
) -> Result<WorkingFile, ProcessingError> {
    match step {
        Step::Optimize(p) => client.optimize(file, p),
        Step::Resize(p) => client.resize(file, p),
        Step::Convert(p) => client.convert(file, p),
        Step::RemoveBackground => client.remove_background(file),
    }
}

pub struct ClientRouter<O, B> {
    optimizer: O,
    background: B,
}

impl<O: ProcessingClient, B: ProcessingClient> ClientRouter<O, B> {
    pub fn new(optimizer: O, background: B) -> Self {
        Self {
            optimizer,
            background,
        }
    }
}

impl<O: ProcessingClient, B: ProcessingClient> ProcessingClient for ClientRouter<O, B> {
    fn optimize(
        &self,
        file: &WorkingFile,
        params: &OptimizeParams,
    ) -> Result<WorkingFile, ProcessingError> {
        self.optimizer.optimize(file, params)
    }

    fn resize(&self, file: &WorkingFile, params: &ResizeParams) -> Result<WorkingFile, ProcessingError> {
        self.optimizer.resize(file, params)
    }

    fn convert(
        &self,
        file: &WorkingFile,
        params: &ConvertParams,
    ) -> Result<WorkingFile, ProcessingError> {
        self.optimizer.convert(file, params)
    }

    fn remove_background(&self, file: &WorkingFile) -> Result<WorkingFile, ProcessingError> {
        self.background.remove_background(file)
    }
}
