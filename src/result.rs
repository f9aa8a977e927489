use log::info;
use ndarray::Array1;


/// Spectrum recorded at one detector patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSpectrum {
    pub ix: usize,
    pub iy: usize,
    /// Zones crossed by the patch's central ray.
    pub nzones: usize,
    pub y: Array1<f64>,
}

/// Output of a detector run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Results {
    /// Patch spectra, ordered by row then column.
    pub patches: Vec<PatchSpectrum>,
    /// Space-integrated spectrum.
    pub ys: Array1<f64>,
    pub units: &'static str,
}

impl Results {
    /// Creates a new `Results` with no patches and a zero integrated spectrum.
    pub fn new_empty(nbins: usize) -> Self {
        Self {
            patches: Vec::new(),
            ys: Array1::zeros(nbins),
            units: "",
        }
    }

    /// Combines partial results from parallel workers.
    pub fn reduce(mut acc: Results, item: Results) -> Results {
        acc.patches.extend(item.patches);
        acc.patches.sort_by_key(|p| (p.iy, p.ix));
        acc
    }

    pub fn patch(&self, ix: usize, iy: usize) -> Option<&PatchSpectrum> {
        self.patches.iter().find(|p| p.ix == ix && p.iy == iy)
    }

    pub fn total_zones(&self) -> usize {
        self.patches.iter().map(|p| p.nzones).sum()
    }

    /// Largest value of the integrated spectrum, `-inf` when it is empty.
    pub fn peak(&self) -> f64 {
        self.ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn print(&self) {
        info!("patches: {}", self.patches.len());
        info!("zone crossings: {}", self.total_zones());
        info!(
            "integrated spectrum: {} bins, peak {:e} ({})",
            self.ys.len(),
            self.peak(),
            self.units
        );
    }
}
