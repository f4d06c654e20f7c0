/// The parts of the dev-service configuration a running broker was started with.
///
/// Equality decides between reusing and restarting a broker. It compares
/// the enabled flag, the image and the fixed port. `extra_args` is kept for
/// reference but ignored: changing only the extra broker arguments reuses the
/// running broker.
#[derive(Debug, Clone)]
pub struct ConfigFingerprint {
    enabled: bool,
    image_name: String,
    fixed_port: Option<u16>,
    extra_args: String,
}

impl ConfigFingerprint {
    pub fn new(
        enabled: bool,
        image_name: impl Into<String>,
        fixed_port: Option<u16>,
        extra_args: impl Into<String>,
    ) -> Self {
        Self {
            enabled,
            image_name: image_name.into(),
            fixed_port,
            extra_args: extra_args.into(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn fixed_port(&self) -> Option<u16> {
        self.fixed_port
    }

    pub fn extra_args(&self) -> &str {
        &self.extra_args
    }
}

impl PartialEq for ConfigFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.enabled == other.enabled
            && self.image_name == other.image_name
            && self.fixed_port == other.fixed_port
    }
}

impl Eq for ConfigFingerprint {}

impl std::hash::Hash for ConfigFingerprint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.enabled.hash(state);
        self.image_name.hash(state);
        self.fixed_port.hash(state);
    }
}
