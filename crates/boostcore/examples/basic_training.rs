//! Boosting a squared-error regression with tree and linear ensembles.
//!
//! Builds a [`SparseMatrix`] with some values missing, trains an [`Ensemble`]
//! of each booster kind for a few rounds, then saves and reloads the tree
//! ensemble.
//!
//! Run with:
//! ```bash
//! cargo run --example basic_training
//! ```

use boostcore::{BoosterKind, BoosterRegistry, Ensemble, Parallelism, SparseMatrix};

fn main() {
    // =========================================================================
    // 1. Prepare Data
    // =========================================================================
    // y = x0 + 0.5*x1 + 0.25*x2 + noise; x2 is missing for every fifth row
    let n_samples = 500;
    let (matrix, labels) = generate_regression_data(n_samples);
    println!(
        "Matrix: {} rows, {} entries, {} columns",
        matrix.num_row(),
        matrix.num_entry(),
        matrix.num_col().expect("column view was built")
    );

    // =========================================================================
    // 2. Train
    // =========================================================================
    for kind in [BoosterKind::Tree, BoosterKind::Linear] {
        let mut ensemble = Ensemble::new(kind);
        ensemble.set_param("eta", "0.3").expect("valid eta");
        ensemble.set_param("max_depth", "4").expect("valid max_depth");
        ensemble.set_param("silent", "0").expect("valid flag");

        println!("\nTraining {kind} ensemble...");
        for round in 0..20 {
            let preds = ensemble
                .predict_batch(&matrix, &[], Parallelism::Parallel)
                .expect("prediction failed");
            if round % 5 == 0 {
                println!("  round {round:>2}: rmse {:.4}", compute_rmse(&preds, &labels));
            }
            let mut grad: Vec<f32> = preds.iter().zip(&labels).map(|(p, y)| p - y).collect();
            let mut hess = vec![1.0; n_samples];
            ensemble
                .boost_round(&mut grad, &mut hess, &matrix, &[])
                .expect("boosting failed");
        }
        let preds = ensemble
            .predict_batch(&matrix, &[], Parallelism::Parallel)
            .expect("prediction failed");
        println!("  final rmse: {:.4}", compute_rmse(&preds, &labels));

        // =====================================================================
        // 3. Save and Reload
        // =====================================================================
        let mut buf = Vec::new();
        ensemble.save(&mut buf).expect("save failed");
        let restored = Ensemble::load(&mut buf.as_slice(), BoosterRegistry::with_defaults())
            .expect("load failed");
        println!(
            "  saved {} members in {} bytes; reloaded prediction for row 0: {:.4}",
            restored.len(),
            buf.len(),
            restored.predict(&matrix, 0, 0)
        );
    }
}

// Helper functions
fn generate_regression_data(n_samples: usize) -> (SparseMatrix, Vec<f32>) {
    let mut matrix = SparseMatrix::new();
    let mut labels = Vec::with_capacity(n_samples);

    for i in 0..n_samples {
        let x0 = (i as f32) / (n_samples as f32) * 10.0;
        let x1 = ((i * 7) % 100) as f32 / 10.0;
        let x2 = ((i * 13) % 100) as f32 / 10.0;

        if i % 5 == 0 {
            matrix.add_row(&[0, 1], &[x0, x1]);
        } else {
            matrix.add_row(&[0, 1, 2], &[x0, x1, x2]);
        }

        let noise = ((i * 31) % 100) as f32 / 500.0 - 0.1;
        labels.push(x0 + 0.5 * x1 + 0.25 * x2 + noise);
    }

    matrix.build_column_view(Parallelism::Parallel);
    (matrix, labels)
}

fn compute_rmse(predictions: &[f32], labels: &[f32]) -> f64 {
    let mse: f64 = predictions
        .iter()
        .zip(labels.iter())
        .map(|(p, l)| {
            let diff = *p as f64 - *l as f64;
            diff * diff
        })
        .sum::<f64>()
        / labels.len() as f64;
    mse.sqrt()
}
