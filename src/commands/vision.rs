// AprilTag observations from the vision pipeline

use std::collections::HashMap;

use crate::messages::TagObservation;

/// Tag measurement from one camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagReading {
    pub y: f64,
    pub yaw: f64,
    pub distance: f64,
}

pub trait Vision {
    /// Latest tag seen by `camera`, if any is currently visible
    fn tag(&self, camera: &str) -> Option<TagReading>;
}

/// Latest observation per camera, kept only while fresh
#[derive(Debug, Clone)]
pub struct TagCache {
    max_age_s: f64,
    latest: HashMap<String, (TagReading, f64)>,
}

impl TagCache {
    pub fn new(max_age_s: f64) -> Self {
        Self {
            max_age_s,
            latest: HashMap::new(),
        }
    }

    pub fn observe(&mut self, observation: &TagObservation, now: f64) {
        if observation.has_tag {
            let reading = TagReading {
                y: observation.y,
                yaw: observation.yaw,
                distance: observation.distance,
            };
            self.latest.insert(observation.camera.clone(), (reading, now));
        } else {
            self.latest.remove(&observation.camera);
        }
    }

    /// Forget observations older than the cache age
    pub fn expire(&mut self, now: f64) {
        let max_age_s = self.max_age_s;
        self.latest.retain(|_, (_, seen)| now - *seen <= max_age_s);
    }
}

impl Vision for TagCache {
    fn tag(&self, camera: &str) -> Option<TagReading> {
        self.latest.get(camera).map(|(reading, _)| *reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(camera: &str, y: f64) -> TagObservation {
        TagObservation {
            camera: camera.to_string(),
            has_tag: true,
            y,
            yaw: 0.0,
            distance: 1.0,
        }
    }

    #[test]
    fn test_cache_is_per_camera() {
        let mut cache = TagCache::new(0.25);
        cache.observe(&seen("LeftCamera", 3.0), 0.0);
        assert_eq!(cache.tag("LeftCamera").map(|t| t.y), Some(3.0));
        assert!(cache.tag("RightCamera").is_none());
    }

    #[test]
    fn test_lost_tag_and_expiry() {
        let mut cache = TagCache::new(0.25);
        cache.observe(&seen("LeftCamera", 3.0), 0.0);
        cache.observe(&seen("RightCamera", -1.0), 0.0);

        let mut lost = seen("LeftCamera", 0.0);
        lost.has_tag = false;
        cache.observe(&lost, 0.1);
        assert!(cache.tag("LeftCamera").is_none());

        cache.expire(0.2);
        assert!(cache.tag("RightCamera").is_some());
        cache.expire(0.3);
        assert!(cache.tag("RightCamera").is_none());
    }
}
