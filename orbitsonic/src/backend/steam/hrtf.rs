use crate::backend::HrtfSelection;
use crate::backend::hrtf_catalog::HrtfProfile;
use crate::error::{OrbitSonicError, Result};
use audionimbus::{AudioSettings, Context, Hrtf, HrtfSettings, Sofa, VolumeNormalization};
use std::path::Path;

/// Steam Audio's built-in HRTF.
pub fn create_default_hrtf(context: &Context, audio_settings: &AudioSettings) -> Result<Hrtf> {
    let hrtf = Hrtf::try_new(
        context,
        audio_settings,
        &HrtfSettings {
            volume_normalization: VolumeNormalization::None,
            sofa_information: None,
            ..Default::default()
        },
    )
    .map_err(|e| OrbitSonicError::SpatialAudio(format!("Failed to create HRTF: {}", e)))?;

    log::info!("Created default HRTF");
    Ok(hrtf)
}

/// Loads an HRTF from a SOFA file.
pub fn create_hrtf_from_file(
    context: &Context,
    audio_settings: &AudioSettings,
    sofa_path: &Path,
) -> Result<Hrtf> {
    let hrtf_data = std::fs::read(sofa_path).map_err(|e| {
        OrbitSonicError::SpatialAudio(format!(
            "Failed to read HRTF file {}: {}",
            sofa_path.display(),
            e
        ))
    })?;

    let hrtf = Hrtf::try_new(
        context,
        audio_settings,
        &HrtfSettings {
            volume_normalization: VolumeNormalization::None,
            sofa_information: Some(Sofa::Buffer(hrtf_data)),
            ..Default::default()
        },
    )
    .map_err(|e| {
        OrbitSonicError::SpatialAudio(format!("Failed to create HRTF from file: {}", e))
    })?;

    log::info!("Created HRTF from file: {}", sofa_path.display());
    Ok(hrtf)
}

/// Loads the requested profile, falling back to the built-in HRTF if there is
/// none or it cannot be loaded.
pub fn create_selected_hrtf(
    context: &Context,
    audio_settings: &AudioSettings,
    profile: Option<&HrtfProfile>,
) -> Result<(Hrtf, HrtfSelection)> {
    if let Some(profile) = profile {
        match create_hrtf_from_file(context, audio_settings, &profile.path) {
            Ok(hrtf) => return Ok((hrtf, HrtfSelection::Named(profile.name.clone()))),
            Err(e) => log::warn!(
                "HRTF \"{}\" could not be loaded ({}), using the default HRTF",
                profile.name,
                e
            ),
        }
    }

    let hrtf = create_default_hrtf(context, audio_settings)?;
    Ok((hrtf, HrtfSelection::Default))
}
