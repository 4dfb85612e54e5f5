use crate::error::{Error, Result};
use crate::table::Table;

/// A single-band raster grid held in memory.
///
/// Values are stored row-major, top row first, as GDAL reads and writes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f32>,
    /// GDAL order: origin x, pixel width, row rotation, origin y, column rotation, pixel height
    pub geo_transform: [f64; 6],
    /// WKT of the coordinate reference system, empty when unknown
    pub projection: String,
    pub nodata: Option<f64>,
}

impl Raster {
    pub fn new(
        rows: usize,
        cols: usize,
        values: Vec<f32>,
        geo_transform: [f64; 6],
        projection: String,
        nodata: Option<f64>,
    ) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                rows,
                cols,
                len: values.len(),
            });
        }
        Ok(Self {
            rows,
            cols,
            values,
            geo_transform,
            projection,
            nodata,
        })
    }

    /// Same grid and georeferencing, new values.
    pub fn with_values(&self, values: Vec<f32>) -> Result<Self> {
        Self::new(
            self.rows,
            self.cols,
            values,
            self.geo_transform,
            self.projection.clone(),
            self.nodata,
        )
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Absolute pixel width and height in CRS units.
    pub fn resolution(&self) -> (f64, f64) {
        let gt = &self.geo_transform;
        (gt[1].hypot(gt[4]), gt[2].hypot(gt[5]))
    }

    pub fn pixel_area(&self) -> f64 {
        let (w, h) = self.resolution();
        (w * h).abs()
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata {
            Some(nd) if nd.is_nan() => false,
            Some(nd) => (value as f64) == nd || value == nd as f32,
            None => false,
        }
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.values[self.index(row, col)])
        } else {
            None
        }
    }

    /// Cell containing the world coordinate, `None` outside the grid.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let [x0, a, b, y0, d, e] = self.geo_transform;
        let det = a * e - b * d;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let dx = x - x0;
        let dy = y - y0;
        let col = (e * dx - b * dy) / det;
        let row = (a * dy - d * dx) / det;
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        if row < self.rows && col < self.cols {
            Some((row, col))
        } else {
            None
        }
    }

    /// World coordinate of the centre of a cell.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let [x0, a, b, y0, d, e] = self.geo_transform;
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (x0 + c * a + r * b, y0 + c * d + r * e)
    }

    /// Value under a world coordinate; `None` outside the grid or on nodata.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (row, col) = self.world_to_pixel(x, y)?;
        let value = self.values[self.index(row, col)];
        if self.is_nodata(value) {
            None
        } else {
            Some(value as f64)
        }
    }

    /// Iterator over the values that are neither NaN nor the nodata sentinel.
    pub fn valid_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied().filter(|v| !self.is_nodata(*v))
    }
}

/// Point features with their attribute table.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub attributes: Table,
    /// First vertex of each feature's geometry, one entry per attribute row
    pub points: Vec<Option<(f64, f64)>>,
    /// WKT of the layer's spatial reference
    pub spatial_ref: Option<String>,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.attributes.n_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_attribute_table(self) -> Table {
        self.attributes
    }
}
