mod backend_desc;
mod engine_desc;
mod voice_config;

pub use backend_desc::SteamBackendDesc;
pub use engine_desc::OrbitSonicEngineDesc;
pub use voice_config::VoiceConfig;
