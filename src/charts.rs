use plotters::{
    prelude::{BitMapBackend, IntoDrawingArea, PathElement},
    series::{AreaSeries, LineSeries},
    style::{Color, Palette, Palette99, BLACK, BLUE, WHITE},
};

use crate::types::Data;

/// Wealth curve for a single episode.
pub fn wealth_chart(
    dir: &str,
    name: &str,
    wealth: &Data,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = format!("{dir}/{name}.png");
    let root = BitMapBackend::new(path.as_str(), (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let y_min = wealth
        .iter()
        .min_by(|a, b| a.partial_cmp(b).unwrap())
        .unwrap()
        * 0.9;
    let y_max = wealth
        .iter()
        .max_by(|a, b| a.partial_cmp(b).unwrap())
        .unwrap()
        * 1.1;

    let mut chart = plotters::chart::ChartBuilder::on(&root)
        .caption(name, ("sans-serif", 20))
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0..wealth.len() as u32, y_min as f32..y_max as f32)?;

    chart.configure_mesh().light_line_style(WHITE).draw()?;

    chart.draw_series(
        AreaSeries::new(
            wealth
                .iter()
                .enumerate()
                .map(|(index, value)| (index as u32, *value as f32)),
            0.0,
            BLUE.mix(0.2),
        )
        .border_style(BLUE),
    )?;

    root.present()
        .expect("unable to write chart to file, perhaps there is no directory");

    Ok(())
}

/// One wealth line per agent, the backtest comparison figure.
pub fn backtest_chart(
    dir: &str,
    curves: &[(String, Data)],
) -> Result<(), Box<dyn std::error::Error>> {
    let path = format!("{dir}/backtest.png");
    let root = BitMapBackend::new(path.as_str(), (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let y_min = curves
        .iter()
        .flat_map(|(_, wealth)| wealth.iter())
        .min_by(|a, b| a.partial_cmp(b).unwrap())
        .unwrap()
        * 0.9;
    let y_max = curves
        .iter()
        .flat_map(|(_, wealth)| wealth.iter())
        .max_by(|a, b| a.partial_cmp(b).unwrap())
        .unwrap()
        * 1.1;
    let x_max = curves
        .iter()
        .map(|(_, wealth)| wealth.len())
        .max()
        .unwrap_or(0) as u32;

    let mut chart = plotters::chart::ChartBuilder::on(&root)
        .caption("Backtest", ("sans-serif", 20))
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0..x_max, y_min as f32..y_max as f32)?;

    chart.configure_mesh().light_line_style(WHITE).draw()?;

    for (index, (label, wealth)) in curves.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        chart
            .draw_series(LineSeries::new(
                wealth
                    .iter()
                    .enumerate()
                    .map(|(step, value)| (step as u32, *value as f32)),
                color.stroke_width(2),
            ))?
            .label(label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;

    root.present()
        .expect("unable to write chart to file, perhaps there is no directory");

    Ok(())
}
