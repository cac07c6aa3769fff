#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

// private modules
mod accuracy;
mod apriori;
mod cfg;
mod constants;
mod error;
mod estimator;
mod lateration;
mod pathloss;
mod power;
mod preliminary;
mod reading;
mod refine;
mod robust;
mod sequential;
mod source;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::accuracy::{Accuracy, Accuracy2D, Accuracy3D};
    pub use crate::cfg::{Config, Measurements, RobustMethod, Targets};
    pub use crate::error::Error;
    pub use crate::estimator::{
        Covariance, Estimate, Estimator, Estimator2D, Estimator3D, Listener, View,
    };
    pub use crate::lateration::Lateration;
    pub use crate::power::{dbm_to_power, power_to_dbm, PathLoss};
    pub use crate::reading::{Reading, Reading2D, Reading3D};
    pub use crate::robust::InliersData;
    pub use crate::sequential::{
        SequentialConfig, SequentialEstimate, SequentialEstimator, SequentialEstimator2D,
        SequentialEstimator3D,
    };
    pub use crate::source::{group_by_source, LocatedRadioSource, RadioSource, RadioSourceKind};
    // re-export
    pub use nalgebra::{DMatrix, Matrix2, Matrix3, Point2, Point3, SMatrix, Vector2, Vector3};
}

// pub export
pub use error::Error;
