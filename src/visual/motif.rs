use super::canvas::Rgba;

/// Colors a motif is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub primary: Rgba,
    pub secondary: Rgba,
    /// Used by the transient flash overlay.
    pub accent: Rgba,
}

/// The geometric figure drawn for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motif {
    /// Concentric rings with a six-petal flower of circles.
    Flower,
    /// Hexagonal node lattice with every pair of nodes connected.
    Cube,
    /// Nested up/down triangles ringed by radial petals.
    Yantra,
}

impl Motif {
    pub const ALL: [Motif; 3] = [Motif::Flower, Motif::Cube, Motif::Yantra];

    /// Motif for the playable track at `index`; wraps past the last motif.
    pub fn for_track(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            Motif::Flower => "Flower of Life",
            Motif::Cube => "Metatron's Cube",
            Motif::Yantra => "Sri Yantra",
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Motif::Flower => Palette {
                primary: Rgba::rgb(255, 196, 84),
                secondary: Rgba::rgb(214, 92, 255),
                accent: Rgba::rgb(255, 244, 214),
            },
            Motif::Cube => Palette {
                primary: Rgba::rgb(72, 220, 255),
                secondary: Rgba::rgb(146, 104, 255),
                accent: Rgba::rgb(220, 250, 255),
            },
            Motif::Yantra => Palette {
                primary: Rgba::rgb(255, 78, 104),
                secondary: Rgba::rgb(255, 168, 56),
                accent: Rgba::rgb(255, 232, 200),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_index_selects_motif_and_wraps() {
        assert_eq!(Motif::for_track(0), Motif::Flower);
        assert_eq!(Motif::for_track(1), Motif::Cube);
        assert_eq!(Motif::for_track(2), Motif::Yantra);
        assert_eq!(Motif::for_track(3), Motif::Flower);
        assert_eq!(Motif::for_track(7), Motif::Cube);
    }

    #[test]
    fn palettes_are_distinct() {
        let primaries: Vec<Rgba> = Motif::ALL.iter().map(|m| m.palette().primary).collect();
        assert_ne!(primaries[0], primaries[1]);
        assert_ne!(primaries[1], primaries[2]);
        for motif in Motif::ALL {
            let palette = motif.palette();
            assert_ne!(palette.primary, palette.secondary, "{}", motif.name());
        }
    }
}
