//! Bottom-left skyline rectangle packing into a fixed bin.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// One horizontal run of the skyline at height `y`.
#[derive(Debug, Clone, Copy)]
struct Segment {
    x: u32,
    y: u32,
    width: u32,
}

pub struct SkylinePacker {
    width: u32,
    height: u32,
    skyline: Vec<Segment>,
}

impl SkylinePacker {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            skyline: vec![Segment {
                x: 0,
                y: 0,
                width,
            }],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Place a rectangle at the lowest, then leftmost, free position.
    pub fn insert(&mut self, width: u32, height: u32) -> Option<Rect> {
        if width == 0 || height == 0 {
            return None;
        }

        let mut best: Option<(usize, Rect)> = None;
        for index in 0..self.skyline.len() {
            let Some(y) = self.fit(index, width, height) else {
                continue;
            };
            let candidate = Rect {
                x: self.skyline[index].x,
                y,
                width,
                height,
            };
            let better = match &best {
                None => true,
                Some((_, current)) => {
                    (candidate.bottom(), candidate.x) < (current.bottom(), current.x)
                }
            };
            if better {
                best = Some((index, candidate));
            }
        }

        let (index, rect) = best?;
        self.place(index, rect);
        Some(rect)
    }

    /// Lowest `y` a rect starting at segment `index` can sit at.
    fn fit(&self, index: usize, width: u32, height: u32) -> Option<u32> {
        let x = self.skyline[index].x;
        if x + width > self.width {
            return None;
        }

        let mut y = 0;
        let mut remaining = width;
        for segment in &self.skyline[index..] {
            y = y.max(segment.y);
            if y + height > self.height {
                return None;
            }
            if segment.width >= remaining {
                return Some(y);
            }
            remaining -= segment.width;
        }
        None
    }

    fn place(&mut self, index: usize, rect: Rect) {
        self.skyline.insert(
            index,
            Segment {
                x: rect.x,
                y: rect.bottom(),
                width: rect.width,
            },
        );

        // Trim the runs now covered by the new one
        let covered_to = rect.right();
        let next = index + 1;
        while next < self.skyline.len() {
            let segment = self.skyline[next];
            if segment.x >= covered_to {
                break;
            }
            let end = segment.x + segment.width;
            if end <= covered_to {
                self.skyline.remove(next);
            } else {
                self.skyline[next] = Segment {
                    x: covered_to,
                    y: segment.y,
                    width: end - covered_to,
                };
                break;
            }
        }

        // Merge neighbours at equal height
        let mut i = 1;
        while i < self.skyline.len() {
            if self.skyline[i - 1].y == self.skyline[i].y {
                self.skyline[i - 1].width += self.skyline[i].width;
                self.skyline.remove(i);
            } else {
                i += 1;
            }
        }
    }
}
