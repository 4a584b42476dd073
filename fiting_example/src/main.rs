use fiting_core::{BufferedFitingTree, FitingTree};

fn main() {
    let data: Vec<u64> = (0..1000).map(|x| x * x).collect();

    let tree: FitingTree<u64, 64> = FitingTree::new(&data).expect("sorted input");
    println!("{} keys in {} segments", tree.len(), tree.segment_count());

    let approx = tree.approx_pos(&250_000);
    println!("approximate window for 250000: {:?}", approx);
    println!("exact index for 250000: {:?}", tree.search(&data, &250_000));

    let mut buffered: BufferedFitingTree<u64, u64> =
        BufferedFitingTree::new(&data).expect("sorted input");
    buffered.insert(123_456, 1_000);
    println!(
        "inserted 123456 -> {:?}",
        buffered.find(&123_456).map(|item| item.pos())
    );

    buffered.erase(&123_456);
    println!("found after erase: {}", buffered.find(&123_456).is_some());

    let window: Vec<u64> = buffered
        .range(&100, &1_000)
        .map(|item| item.key())
        .collect();
    println!("keys in [100, 1000]: {:?}", window);
}
