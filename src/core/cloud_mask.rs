use crate::types::{Band, Scene};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Quality band layout used to flag cloudy pixels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaBits {
    /// Name of the quality band (Sentinel-2: QA60)
    pub band: String,
    /// Opaque cloud bit
    pub cloud_bit: u8,
    /// Cirrus bit
    pub cirrus_bit: u8,
}

impl Default for QaBits {
    fn default() -> Self {
        Self {
            band: "QA60".to_string(),
            cloud_bit: 10,
            cirrus_bit: 11,
        }
    }
}

impl QaBits {
    /// A quality value is clear only if both the cloud and cirrus bits are zero
    pub fn is_clear(&self, qa: f32) -> bool {
        if !qa.is_finite() {
            return false;
        }
        let bits = qa as i64;
        let mask = (1i64 << self.cloud_bit) | (1i64 << self.cirrus_bit);
        bits & mask == 0
    }
}

/// Set every cloudy or cirrus-flagged pixel of the scene's reflectance bands
/// to missing and drop the quality band.
///
/// A scene without a quality band cannot be verified and comes back fully
/// missing.
pub fn mask_clouds(mut scene: Scene, bits: &QaBits) -> Scene {
    let Some(qa) = scene.stack.remove_band(&bits.band) else {
        log::warn!(
            "Scene {} has no {} band; masking all pixels",
            scene.id,
            bits.band
        );
        let shape = scene.stack.grid.shape();
        for name in scene.stack.band_names() {
            // Shape always matches, so replacing cannot fail
            let _ = scene.stack.set_band(Band::missing(name, shape));
        }
        return scene;
    };

    let clear = qa.data.mapv(|v| bits.is_clear(v));
    let clear_count = clear.iter().filter(|&&c| c).count();
    log::debug!(
        "Scene {}: {} of {} pixels clear",
        scene.id,
        clear_count,
        clear.len()
    );

    let mut masked = Vec::with_capacity(scene.stack.len());
    for band in scene.stack.bands() {
        let mut data = band.data.clone();
        Zip::from(&mut data).and(&clear).for_each(|v, &ok| {
            if !ok {
                *v = f32::NAN;
            }
        });
        masked.push(Band::new(band.name.clone(), data));
    }
    for band in masked {
        let _ = scene.stack.set_band(band);
    }

    scene
}
