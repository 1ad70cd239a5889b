use crate::update::{Domain, Update};

/// Materialized state of one domain.
///
/// Both the store and downstream consumers keep an image and fold updates
/// into it; a full image payload lists the complete state so that
/// [`Image::restore`] on an empty image reproduces it exactly.
pub trait Image: Default + Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;

    const DOMAIN: Domain;

    /// Folds an incremental change set into the image.
    fn apply(&mut self, payload: &Self::Payload);

    /// Complete state as a payload suitable for a full image update.
    fn snapshot(&self) -> Self::Payload;

    /// Discards the current state and rebuilds it from a full image payload.
    fn restore(&mut self, payload: &Self::Payload) {
        *self = Self::default();
        self.apply(payload);
    }

    /// Applies an update received from the service, honouring the full image flag.
    fn absorb(&mut self, update: &Update<Self::Payload>) {
        if update.full_image {
            self.restore(&update.payload);
        } else {
            self.apply(&update.payload);
        }
    }
}
