// Flow
// Tracks floating items anchored left or right and the vertical extent of the
// laid out document. Lines consult it to widen their margins around floats.

use crate::draw_context::Rect;

use super::custom_item::{CustomItem, ItemId, Placement};

/// Geometry of one registered floating item. The item itself stays owned by
/// its character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatRecord {
    pub id: ItemId,
    pub xpos: i32,
    pub ypos: i32,
    pub width: i32,
    pub height: i32,
}

impl FloatRecord {
    fn of(item: &CustomItem) -> Self {
        FloatRecord {
            id: item.id(),
            xpos: item.xpos,
            ypos: item.ypos,
            width: item.width,
            height: item.height,
        }
    }

    pub fn is_positioned(&self) -> bool {
        self.xpos != -1 && self.ypos != -1
    }

    fn covers(&self, y: i32, h: i32) -> bool {
        self.ypos != -1 && y < self.ypos + self.height && y + h.max(1) > self.ypos
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.xpos, self.ypos, self.width, self.height)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Flow {
    width: i32,
    page_size: i32,
    height: i32,
    left_items: Vec<FloatRecord>,
    right_items: Vec<FloatRecord>,
}

impl Flow {
    pub fn new() -> Self {
        Flow::default()
    }

    pub fn clear(&mut self) {
        self.left_items.clear();
        self.right_items.clear();
        self.height = 0;
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn set_width(&mut self, width: i32) {
        self.width = width;
    }

    pub fn page_size(&self) -> i32 {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: i32) {
        self.page_size = page_size.max(0);
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Forget the tracked height; the next layout pass grows it again
    pub fn reset_height(&mut self) {
        self.height = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.left_items.is_empty() && self.right_items.is_empty()
    }

    pub fn floating_count(&self) -> usize {
        self.left_items.len() + self.right_items.len()
    }

    pub fn is_registered(&self, id: ItemId) -> bool {
        self.find(id).is_some()
    }

    fn find(&self, id: ItemId) -> Option<&FloatRecord> {
        self.left_items
            .iter()
            .chain(self.right_items.iter())
            .find(|r| r.id == id)
    }

    fn find_mut(&mut self, id: ItemId) -> Option<&mut FloatRecord> {
        self.left_items
            .iter_mut()
            .chain(self.right_items.iter_mut())
            .find(|r| r.id == id)
    }

    pub fn register_floating_item(&mut self, item: &CustomItem) {
        if self.is_registered(item.id()) {
            return;
        }
        let record = FloatRecord::of(item);
        match item.placement() {
            Placement::Left => self.left_items.push(record),
            Placement::Right => self.right_items.push(record),
            Placement::Inline => {
                log::warn!(
                    "Flow::register_floating_item: item {} is not floating",
                    item.id()
                );
            }
        }
    }

    pub fn unregister_floating_item(&mut self, id: ItemId) -> bool {
        let before = self.floating_count();
        self.left_items.retain(|r| r.id != id);
        self.right_items.retain(|r| r.id != id);
        before != self.floating_count()
    }

    /// Copy the current geometry of a registered item
    pub fn update_item(&mut self, item: &CustomItem) {
        if let Some(record) = self.find_mut(item.id()) {
            *record = FloatRecord::of(item);
        }
    }

    /// Mark a registered item as needing a new position
    pub fn unposition(&mut self, id: ItemId) {
        if let Some(record) = self.find_mut(id) {
            record.xpos = -1;
            record.ypos = -1;
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &FloatRecord> {
        self.left_items.iter().chain(self.right_items.iter())
    }

    /// Widen a left margin so a line at `y` with height `h` clears every
    /// left-floating item it overlaps
    pub fn adjust_lmargin(&self, y: i32, h: i32, margin: i32, space: i32) -> i32 {
        self.left_items
            .iter()
            .filter(|r| r.covers(y, h))
            .fold(margin, |m, r| m.max(r.xpos + r.width + space))
    }

    /// Same as `adjust_lmargin` for the right side
    pub fn adjust_rmargin(&self, y: i32, h: i32, margin: i32, space: i32) -> i32 {
        self.right_items
            .iter()
            .filter(|r| r.covers(y, h))
            .fold(margin, |m, r| m.max(self.width - r.xpos + space))
    }

    /// Push a run starting at `y` past a page boundary if it would straddle
    /// one, and grow the tracked height. Returns the adjusted `y`.
    pub fn adjust_flow(&mut self, y: i32, _width: i32, h: i32, pages: bool) -> i32 {
        let mut y = y;
        if pages && self.page_size > 0 {
            let in_page = y % self.page_size;
            if in_page <= 2 {
                y += 2 - in_page;
            } else if in_page + h > self.page_size - 2 {
                y += (self.page_size - in_page) + 2;
            }
        }
        if y + h > self.height {
            self.height = y + h;
        }
        y
    }

    /// Grow the tracked height to include a newly placed item
    pub fn update_height(&mut self, item: &CustomItem) {
        if item.ypos != -1 && item.ypos + item.height > self.height {
            self.height = item.ypos + item.height;
        }
        self.update_item(item);
    }

    /// Positioned items intersecting `clip`, in registration order
    pub fn visible_items(&self, clip: Rect) -> Vec<ItemId> {
        self.records()
            .filter(|r| r.is_positioned())
            .filter(|r| clip.is_empty() || r.rect().intersects(&clip))
            .map(|r| r.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(id: ItemId, placement: Placement, x: i32, y: i32, w: i32, h: i32) -> CustomItem {
        let mut item = CustomItem::image(id, "img.png", w, h, placement);
        item.xpos = x;
        item.ypos = y;
        item
    }

    #[test]
    fn test_margins_clear_floats() {
        let mut flow = Flow::new();
        flow.set_width(400);
        flow.register_floating_item(&placed(1, Placement::Left, 0, 10, 50, 40));
        flow.register_floating_item(&placed(2, Placement::Right, 330, 10, 70, 20));

        assert_eq!(flow.adjust_lmargin(20, 10, 5, 2), 52);
        assert_eq!(flow.adjust_lmargin(60, 10, 5, 2), 5);
        assert_eq!(flow.adjust_rmargin(15, 10, 0, 2), 72);
        assert_eq!(flow.adjust_rmargin(40, 10, 0, 2), 0);
    }

    #[test]
    fn test_unpositioned_items_are_ignored() {
        let mut flow = Flow::new();
        flow.set_width(400);
        let item = CustomItem::image(1, "img.png", 50, 50, Placement::Left);
        flow.register_floating_item(&item);
        assert_eq!(flow.adjust_lmargin(0, 10, 0, 0), 0);
        assert!(flow.visible_items(Rect::new(0, 0, 400, 400)).is_empty());
    }

    #[test]
    fn test_page_break_pushes_run() {
        let mut flow = Flow::new();
        flow.set_page_size(100);
        assert_eq!(flow.adjust_flow(90, 100, 20, true), 102);
        assert_eq!(flow.adjust_flow(0, 100, 20, true), 2);
        assert_eq!(flow.adjust_flow(40, 100, 20, true), 40);
        assert_eq!(flow.adjust_flow(90, 100, 20, false), 90);
        assert_eq!(flow.height(), 122);
    }

    #[test]
    fn test_unregister() {
        let mut flow = Flow::new();
        flow.register_floating_item(&placed(7, Placement::Right, 0, 0, 10, 10));
        assert!(flow.is_registered(7));
        assert!(flow.unregister_floating_item(7));
        assert!(!flow.unregister_floating_item(7));
        assert!(flow.is_empty());
    }
}
