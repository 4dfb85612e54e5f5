pub mod autocorrelation;
pub mod error;
pub mod join;
pub mod linalg;
pub mod model;
pub mod normalize;
pub mod pca;
pub mod plot;
pub mod reader;
pub mod sampling;
pub mod stats;
pub mod table;
pub mod water_mass;
pub mod weights;
pub mod writer;

pub use autocorrelation::{run_autocorrelation, AutocorrelationOptions};
pub use error::{Error, Result};
pub use join::{run_join, JoinOptions};
pub use model::{FeatureCollection, Raster};
pub use normalize::run_normalize;
pub use pca::{run_pca, PcaOptions};
pub use sampling::{run_sampling, SamplingOptions};
pub use table::{Cell, Table};
pub use water_mass::run_water_mass;
pub use weights::{Contiguity, SpatialWeights};
pub use writer::GeoTiffWriter;
