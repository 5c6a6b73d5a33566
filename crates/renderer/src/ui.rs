//! Debug overlay widgets: the scene picker and the FPS monitor.

use framestats::FpsHistory;

use crate::frame::OverlayView;
use crate::scenes::{SceneId, SceneLabel};

const CHART_HEIGHT: f32 = 150.0;
const CHART_MIN_WIDTH: f32 = 280.0;

/// Label shown in the picker for a scene.
pub(crate) fn scene_label<P: SceneLabel>(program: &P) -> String {
    if program.is_degraded() {
        format!("{} (failed)", program.label())
    } else {
        program.label().to_string()
    }
}

pub(crate) fn summary_line(history: &FpsHistory) -> String {
    let stats = history.stats();
    format!(
        "Current: {:.1} FPS | Avg: {:.1} FPS",
        stats.current, stats.average
    )
}

pub(crate) fn frame_time_line(history: &FpsHistory) -> String {
    format!("Frame time: {:.2} ms", history.stats().frame_time_ms)
}

/// Draws both overlay windows. Returns the scene picked this frame, if any.
pub(crate) fn draw_overlay<P: SceneLabel>(
    ctx: &egui::Context,
    view: &OverlayView<'_, P>,
    timer: &str,
) -> Option<SceneId> {
    let picked = scene_window(ctx, view);
    fps_window(ctx, view, timer);
    picked
}

fn scene_window<P: SceneLabel>(ctx: &egui::Context, view: &OverlayView<'_, P>) -> Option<SceneId> {
    let active = view.registry.active_id();
    let mut selected = active;

    egui::Window::new("Scene")
        .default_pos([16.0, 16.0])
        .resizable(false)
        .show(ctx, |ui| {
            egui::ComboBox::from_label("Scene to render")
                .selected_text(scene_label(view.registry.active()))
                .show_ui(ui, |ui| {
                    for (id, program) in view.registry.iter() {
                        ui.selectable_value(&mut selected, id, scene_label(program));
                    }
                });
        });

    changed_selection(active, selected)
}

fn changed_selection(active: SceneId, selected: SceneId) -> Option<SceneId> {
    (selected != active).then_some(selected)
}

fn fps_window<P>(ctx: &egui::Context, view: &OverlayView<'_, P>, timer: &str) {
    egui::Window::new("FPS Monitor")
        .default_pos([16.0, 120.0])
        .show(ctx, |ui| {
            ui.label(summary_line(view.history));
            fps_chart(ui, view.history);
            ui.label(frame_time_line(view.history));
            let gpu = view
                .last_elapsed
                .map(|elapsed| format!("{:.3} ms", elapsed.as_millis_f32()))
                .unwrap_or_else(|| "n/a".to_string());
            ui.weak(format!("GPU ({timer}): {gpu}"));
        });
}

fn fps_chart(ui: &mut egui::Ui, history: &FpsHistory) {
    let range = history.chart_range();
    let size = egui::vec2(ui.available_width().max(CHART_MIN_WIDTH), CHART_HEIGHT);
    let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
    let rect = response.rect;
    let visuals = ui.visuals();

    painter.rect_filled(rect, 2.0, visuals.extreme_bg_color);

    let count = history.len();
    if count >= 2 {
        let step = rect.width() / (count - 1) as f32;
        let points: Vec<egui::Pos2> = history
            .iter()
            .enumerate()
            .map(|(index, fps)| {
                egui::pos2(
                    rect.left() + index as f32 * step,
                    rect.bottom() - range.normalize(fps) * rect.height(),
                )
            })
            .collect();
        painter.add(egui::Shape::line(
            points,
            egui::Stroke::new(1.5, visuals.selection.stroke.color),
        ));
    }

    painter.text(
        rect.center_top() + egui::vec2(0.0, 4.0),
        egui::Align2::CENTER_TOP,
        format!("{:.1} FPS", history.stats().current),
        egui::FontId::monospace(12.0),
        visuals.text_color(),
    );
}
