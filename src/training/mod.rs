//! Link-prediction training: edge split, optimization loop, and ROC-AUC evaluation.

pub mod metrics;
pub mod split;
pub mod trainer;

pub use metrics::{roc_auc, sigmoid, EvaluationError};
pub use split::{random_link_split, LabeledEdges, LinkSplit, Partition, SplitError};
pub use trainer::{EpochMetrics, TrainError, Trainer, TrainingReport};
